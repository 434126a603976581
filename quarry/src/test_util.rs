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

//! Common unit test utility methods

use crate::configs::AthenaConfig;
use crate::error::{QuarryError, Result};
use crate::service::{ExecutionStatus, QueryService, ResultPage};
use async_trait::async_trait;
use rusoto_core::Region;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// A query submission recorded by [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The database of the query.
    pub database:        String,
    /// The output location of the query.
    pub output_location: String,
    /// The SQL text of the query.
    pub sql:             String,
    /// The execution id handed out for the query.
    pub execution_id:    String,
}

/// A result page request recorded by [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCall {
    /// The execution id of the request.
    pub execution_id: String,
    /// The continuation token of the request.
    pub next_token:   Option<String>,
    /// The page size of the request.
    pub page_size:    Option<i64>,
}

#[derive(Default)]
struct ScriptState {
    submissions:  Vec<Submission>,
    sql_by_id:    HashMap<String, String>,
    status_calls: HashMap<String, usize>,
    result_calls: Vec<ResultCall>,
}

/// An in-memory [`QueryService`] that replays scripted responses.
///
/// Every execution replays the same status script, one entry per status
/// call, repeating the last entry once the script is exhausted. Scripts can
/// be overridden per SQL text. Result pages are served in order: the first
/// page on a call without a token, then the page following the one that
/// handed out the token.
pub struct ScriptedService {
    statuses:    Vec<ExecutionStatus>,
    overrides:   HashMap<String, Vec<ExecutionStatus>>,
    pages:       Vec<ResultPage>,
    failing_sql: HashSet<String>,
    state:       Mutex<ScriptState>,
}

impl ScriptedService {
    /// Creates a service whose executions follow `statuses` and whose
    /// results are `pages`.
    pub fn new(statuses: Vec<ExecutionStatus>, pages: Vec<ResultPage>) -> Self {
        Self {
            statuses,
            overrides: HashMap::new(),
            pages,
            failing_sql: HashSet::new(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Uses `statuses` for executions of `sql` instead of the default script.
    pub fn with_statuses_for(mut self, sql: &str, statuses: Vec<ExecutionStatus>) -> Self {
        self.overrides.insert(sql.to_owned(), statuses);
        self
    }

    /// Rejects the submission of `sql`.
    pub fn with_failing_submit(mut self, sql: &str) -> Self {
        self.failing_sql.insert(sql.to_owned());
        self
    }

    /// Returns every accepted submission, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Returns the number of status calls made for `execution_id`.
    pub fn status_calls(&self, execution_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(execution_id)
            .copied()
            .unwrap_or_default()
    }

    /// Returns every result call, in order.
    pub fn result_calls(&self) -> Vec<ResultCall> {
        self.state.lock().unwrap().result_calls.clone()
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn submit(&self, database: &str, output_location: &str, sql: &str) -> Result<String> {
        if self.failing_sql.contains(sql) {
            return Err(QuarryError::AWS("InvalidRequestException".to_owned()));
        }

        let mut state = self.state.lock().unwrap();
        let execution_id = format!("execution-{}", state.submissions.len());
        state.submissions.push(Submission {
            database:        database.to_owned(),
            output_location: output_location.to_owned(),
            sql:             sql.to_owned(),
            execution_id:    execution_id.clone(),
        });
        state
            .sql_by_id
            .insert(execution_id.clone(), sql.to_owned());
        Ok(execution_id)
    }

    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let script = state
            .sql_by_id
            .get(execution_id)
            .and_then(|sql| self.overrides.get(sql))
            .unwrap_or(&self.statuses);
        let calls = state
            .status_calls
            .entry(execution_id.to_owned())
            .or_default();
        let status = script
            .get(*calls)
            .or_else(|| script.last())
            .cloned()
            .ok_or_else(|| QuarryError::Internal("empty status script".to_owned()))?;
        *calls += 1;
        Ok(status)
    }

    async fn results(
        &self,
        execution_id: &str,
        next_token: Option<String>,
        page_size: Option<i64>,
    ) -> Result<ResultPage> {
        self.state.lock().unwrap().result_calls.push(ResultCall {
            execution_id: execution_id.to_owned(),
            next_token: next_token.clone(),
            page_size,
        });

        let index = match next_token {
            None => 0,
            Some(token) => {
                self.pages
                    .iter()
                    .position(|p| p.next_token.as_deref() == Some(token.as_str()))
                    .ok_or_else(|| QuarryError::AWS(format!("unknown token {}", token)))?
                    + 1
            }
        };
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

/// Returns a page with `rows` single-cell rows and the given token.
pub fn page(rows: usize, next_token: Option<&str>) -> ResultPage {
    ResultPage {
        rows:       (0..rows).map(|i| vec![Some(i.to_string())]).collect(),
        next_token: next_token.map(|t| t.to_owned()),
    }
}

/// Returns a configuration that polls every second and never touches AWS.
pub fn test_config() -> AthenaConfig {
    AthenaConfig {
        region:           Region::UsWest2,
        database:         "invoice_db".to_owned(),
        output_bucket:    "s3://quarry-test/".to_owned(),
        poll_interval:    Duration::from_secs(1),
        max_polls:        600,
        page_size:        None,
        isolate_failures: false,
    }
}
