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

//! Quarry error types

use std::error;
use std::fmt::{Display, Formatter};
use std::result;

/// Result type for operations that could result in an [QuarryError]
pub type Result<T> = result::Result<T, QuarryError>;

/// Quarry error
#[derive(Debug)]
pub enum QuarryError {
    /// Error associated to Lambda runtime execution.
    LambdaError(Box<dyn std::error::Error + Send + Sync>),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned when accessing the AWS services fails. Submission,
    /// status and result calls all surface their transport, authorization and
    /// validation errors through this variant.
    AWS(String),
    /// The query service reported the execution as `FAILED`. Carries the
    /// reason string supplied by the service.
    QueryFailed(String),
    /// The query service reported the execution as `CANCELLED`.
    QueryCancelled,
    /// The execution did not reach a terminal state within the configured
    /// number of status polls.
    PollTimeout(String, usize),
    /// One or more queries of the catalog failed while failures were
    /// isolated. Carries the names of the failed queries.
    Batch(Vec<String>),
    /// Error returned when a configuration value is missing or malformed.
    Config(String),
    /// Error returned as a consequence of an error in Quarry.
    /// This error should not happen in normal usage of Quarry.
    Internal(String),
}

impl From<serde_json::Error> for QuarryError {
    fn from(e: serde_json::Error) -> Self {
        QuarryError::SerdeJson(e)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for QuarryError {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        QuarryError::LambdaError(e)
    }
}

impl Display for QuarryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            QuarryError::LambdaError(ref desc) => write!(f, "Lambda error: {}", desc),
            QuarryError::SerdeJson(ref desc) => write!(f, "serde_json error: {:?}", desc),
            QuarryError::AWS(ref desc) => write!(f, "AWS error: {}", desc),
            QuarryError::QueryFailed(ref reason) => {
                write!(f, "Query Failed to run with Error Message: {}", reason)
            }
            QuarryError::QueryCancelled => write!(f, "Query was cancelled."),
            QuarryError::PollTimeout(ref id, polls) => write!(
                f,
                "Query execution {} did not finish after {} status polls",
                id, polls
            ),
            QuarryError::Batch(ref names) => {
                write!(f, "{} queries failed: {}", names.len(), names.join(", "))
            }
            QuarryError::Config(ref desc) => write!(f, "Configuration error: {}", desc),
            QuarryError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in Quarry's \
                    code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
        }
    }
}

impl error::Error for QuarryError {}
