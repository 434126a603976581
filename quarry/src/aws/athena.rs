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

//! This crate contains all wrapped functions of the AWS Athena service.

use crate::error::{QuarryError, Result};
use crate::service::{ExecutionStatus, QueryService, ResultPage, Row};
use async_trait::async_trait;
use rusoto_athena::{
    Athena, AthenaClient, GetQueryExecutionInput, GetQueryExecutionOutput, GetQueryResultsInput,
    GetQueryResultsOutput, QueryExecutionContext, ResultConfiguration, StartQueryExecutionInput,
};

/// [`QueryService`] backed by Amazon Athena.
#[derive(Clone)]
pub struct AthenaService {
    client: AthenaClient,
}

impl AthenaService {
    /// Creates a new Athena service on top of the given client.
    pub fn new(client: AthenaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryService for AthenaService {
    async fn submit(&self, database: &str, output_location: &str, sql: &str) -> Result<String> {
        let request = StartQueryExecutionInput {
            query_string: sql.to_owned(),
            query_execution_context: Some(QueryExecutionContext {
                database: Some(database.to_owned()),
                ..Default::default()
            }),
            result_configuration: Some(ResultConfiguration {
                output_location: Some(output_location.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.client
            .start_query_execution(request)
            .await
            .map_err(|e| QuarryError::AWS(e.to_string()))?
            .query_execution_id
            .ok_or_else(|| QuarryError::Internal("Athena returned no execution id".to_owned()))
    }

    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution(GetQueryExecutionInput {
                query_execution_id: execution_id.to_owned(),
                ..Default::default()
            })
            .await
            .map_err(|e| QuarryError::AWS(e.to_string()))?;
        Ok(execution_status(output))
    }

    async fn results(
        &self,
        execution_id: &str,
        next_token: Option<String>,
        page_size: Option<i64>,
    ) -> Result<ResultPage> {
        let output = self
            .client
            .get_query_results(GetQueryResultsInput {
                query_execution_id: execution_id.to_owned(),
                next_token,
                max_results: page_size,
                ..Default::default()
            })
            .await
            .map_err(|e| QuarryError::AWS(e.to_string()))?;
        Ok(result_page(output))
    }
}

/// Extracts the execution status from a `GetQueryExecution` response. A
/// response without a state is reported as [`ExecutionStatus::Unknown`], so
/// the caller keeps polling.
pub fn execution_status(output: GetQueryExecutionOutput) -> ExecutionStatus {
    match output.query_execution.and_then(|q| q.status) {
        Some(status) => ExecutionStatus::from_state(
            status.state.as_deref().unwrap_or_default(),
            status.state_change_reason,
        ),
        None => ExecutionStatus::Unknown(String::new()),
    }
}

/// Converts a `GetQueryResults` response to a result page. The first page
/// of a `SELECT` starts with the column headers.
pub fn result_page(output: GetQueryResultsOutput) -> ResultPage {
    let rows = output
        .result_set
        .and_then(|set| set.rows)
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.data
                .unwrap_or_default()
                .into_iter()
                .map(|datum| datum.var_char_value)
                .collect::<Row>()
        })
        .collect();

    ResultPage {
        rows,
        next_token: output.next_token,
    }
}
