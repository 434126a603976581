// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! The interface to a managed query service that runs SQL asynchronously.
//!
//! A query goes through three calls: it is submitted, which yields an
//! execution id, its status is fetched until it is terminal, and its result
//! set is read page by page.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt::{Display, Formatter};

/// The state of a query execution as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Accepted but not started yet.
    Queued,
    /// Running.
    Running,
    /// Finished, results are available.
    Succeeded,
    /// Finished with an error. Carries the service's reason, if any.
    Failed(Option<String>),
    /// Cancelled by a user or by the service.
    Cancelled,
    /// A state this crate doesn't know. Treated as still running.
    Unknown(String),
}

impl ExecutionStatus {
    /// Maps the raw state string of the service to a status.
    pub fn from_state(state: &str, reason: Option<String>) -> Self {
        match state {
            "QUEUED" => ExecutionStatus::Queued,
            "RUNNING" => ExecutionStatus::Running,
            "SUCCEEDED" => ExecutionStatus::Succeeded,
            "FAILED" => ExecutionStatus::Failed(reason),
            "CANCELLED" => ExecutionStatus::Cancelled,
            other => ExecutionStatus::Unknown(other.to_owned()),
        }
    }

    /// Returns true if no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed(_) | ExecutionStatus::Cancelled
        )
    }
}

impl Display for ExecutionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "QUEUED"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::Failed(_) => write!(f, "FAILED"),
            ExecutionStatus::Cancelled => write!(f, "CANCELLED"),
            ExecutionStatus::Unknown(state) => write!(f, "{}", state),
        }
    }
}

/// A row of a result set. `None` is a SQL NULL.
pub type Row = Vec<Option<String>>;

/// One page of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    /// The rows of this page.
    pub rows:       Vec<Row>,
    /// The token to fetch the next page with. `None` on the last page.
    pub next_token: Option<String>,
}

/// A managed query service with an asynchronous execution API.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Starts running `sql` against `database`. The service writes the
    /// results under `output_location`.
    ///
    /// # Returns
    /// The execution id of the query.
    async fn submit(&self, database: &str, output_location: &str, sql: &str) -> Result<String>;

    /// Fetches the current status of an execution.
    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus>;

    /// Fetches one page of the results of a succeeded execution.
    ///
    /// # Arguments
    /// * `execution_id` - The execution id returned by `submit`.
    /// * `next_token` - The token of the previous page, `None` for the first
    ///   page.
    /// * `page_size` - The maximum number of rows, `None` for the service
    ///   default.
    async fn results(
        &self,
        execution_id: &str,
        next_token: Option<String>,
        page_size: Option<i64>,
    ) -> Result<ResultPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states() {
        assert_eq!(ExecutionStatus::from_state("QUEUED", None), ExecutionStatus::Queued);
        assert_eq!(ExecutionStatus::from_state("RUNNING", None), ExecutionStatus::Running);
        assert_eq!(
            ExecutionStatus::from_state("FAILED", Some("boom".to_owned())),
            ExecutionStatus::Failed(Some("boom".to_owned()))
        );
        assert!(ExecutionStatus::from_state("CANCELLED", None).is_terminal());
        assert!(ExecutionStatus::from_state("SUCCEEDED", None).is_terminal());
    }

    #[test]
    fn unknown_state_is_not_terminal() {
        let status = ExecutionStatus::from_state("PAUSED", None);
        assert_eq!(status, ExecutionStatus::Unknown("PAUSED".to_owned()));
        assert!(!status.is_terminal());
        assert_eq!(status.to_string(), "PAUSED");
    }
}
