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

//! Runs the query catalog against a [`QueryService`].
//!
//! Every query goes through the same three steps, strictly one query after
//! the other:
//!
//! 1. [`submit`] the SQL with a fresh output location;
//! 2. [`wait_for_completion`] by polling the status on a fixed interval;
//! 3. [`drain_results`] by walking the result pages until no continuation
//!    token is left.
//!
//! Rows are counted while draining but never kept.

use crate::catalog::CatalogEntry;
use crate::configs::AthenaConfig;
use crate::error::{QuarryError, Result};
use crate::service::{ExecutionStatus, QueryService, ResultPage};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::time::Duration;

/// What draining the result set of one execution went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// The number of pages fetched.
    pub pages: usize,
    /// The number of rows seen, including the header row Athena puts on
    /// the first page.
    pub rows:  usize,
}

impl DrainSummary {
    fn record(&mut self, page: &ResultPage) {
        self.pages += 1;
        self.rows += page.rows.len();
    }
}

/// The outcome of one catalog query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReport {
    /// The catalog name of the query.
    pub name:            String,
    /// The execution id assigned by the service.
    pub execution_id:    String,
    /// Where the service wrote the results.
    pub output_location: String,
    /// The number of status polls until the query succeeded.
    pub polls:           usize,
    /// The result pages walked.
    pub drain:           DrainSummary,
}

/// Formats the invocation start time used in output locations, down to the
/// microsecond.
pub fn run_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Returns the output location of a query: `<prefix><timestamp>/<name>/`.
///
/// # Arguments
/// * `prefix` - The S3 prefix of all query results.
/// * `timestamp` - The invocation start time, see [`run_timestamp`].
/// * `name` - The catalog name of the query.
pub fn output_location(prefix: &str, timestamp: &str, name: &str) -> String {
    let separator = if prefix.ends_with('/') { "" } else { "/" };
    format!("{}{}{}/{}/", prefix, separator, timestamp, name)
}

/// Submits a query. Errors are not retried.
///
/// # Returns
/// The execution id of the query.
pub async fn submit(
    service: &dyn QueryService,
    database: &str,
    output_location: &str,
    sql: &str,
) -> Result<String> {
    let execution_id = service.submit(database, output_location, sql).await?;
    info!("Submitted query {} to {}", execution_id, output_location);
    Ok(execution_id)
}

/// Waits for a query to succeed, fail or to be cancelled. This is done by
/// polling the service every `interval`. If the query fails or is cancelled,
/// an error is returned.
///
/// # Arguments
/// * `service` - The query service.
/// * `execution_id` - The execution id returned by [`submit`].
/// * `interval` - The fixed delay between two status polls.
/// * `max_polls` - The maximum number of status polls, `0` for no limit.
///
/// # Returns
/// The number of status polls performed.
pub async fn wait_for_completion(
    service: &dyn QueryService,
    execution_id: &str,
    interval: Duration,
    max_polls: usize,
) -> Result<usize> {
    let mut polls = 0;
    loop {
        let status = service.status(execution_id).await?;
        polls += 1;
        info!("Current Status is: {}", status);

        match status {
            ExecutionStatus::Succeeded => return Ok(polls),
            ExecutionStatus::Failed(reason) => {
                return Err(QuarryError::QueryFailed(
                    reason.unwrap_or_else(|| "no reason given".to_owned()),
                ));
            }
            ExecutionStatus::Cancelled => return Err(QuarryError::QueryCancelled),
            ExecutionStatus::Unknown(state) => {
                warn!("Unknown state {:?} of query {}", state, execution_id);
            }
            ExecutionStatus::Queued | ExecutionStatus::Running => {}
        }

        if max_polls > 0 && polls >= max_polls {
            return Err(QuarryError::PollTimeout(execution_id.to_owned(), polls));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Walks the result set of a succeeded query. The query must be in a
/// completed state before the results can be retrieved and paginated.
///
/// # Arguments
/// * `service` - The query service.
/// * `execution_id` - The execution id returned by [`submit`].
/// * `page_size` - The rows per page, `None` for the service maximum.
pub async fn drain_results(
    service: &dyn QueryService,
    execution_id: &str,
    page_size: Option<i64>,
) -> Result<DrainSummary> {
    let mut summary = DrainSummary::default();

    let mut page = service.results(execution_id, None, page_size).await?;
    summary.record(&page);

    // If next token is none, there are no more pages to read.
    while let Some(token) = page.next_token.take() {
        page = service.results(execution_id, Some(token), page_size).await?;
        summary.record(&page);
    }

    Ok(summary)
}

/// Runs a single catalog query: submit, wait and drain.
///
/// # Arguments
/// * `service` - The query service.
/// * `conf` - The Athena configuration.
/// * `timestamp` - The invocation start time, see [`run_timestamp`].
/// * `query` - The catalog entry to run.
pub async fn run_query(
    service: &dyn QueryService,
    conf: &AthenaConfig,
    timestamp: &str,
    query: &CatalogEntry,
) -> Result<QueryReport> {
    let output_location = output_location(&conf.output_bucket, timestamp, query.name);
    let execution_id = submit(service, &conf.database, &output_location, query.sql).await?;
    let polls =
        wait_for_completion(service, &execution_id, conf.poll_interval, conf.max_polls).await?;
    let drain = drain_results(service, &execution_id, conf.page_size).await?;

    Ok(QueryReport {
        name: query.name.to_owned(),
        execution_id,
        output_location,
        polls,
        drain,
    })
}

/// Runs every query of `catalog` in order.
///
/// With `conf.isolate_failures` unset, the first failing query aborts the
/// batch and its error is returned. Otherwise failures are logged, the
/// remaining queries still run, and a [`QuarryError::Batch`] naming the
/// failed queries is returned at the end.
pub async fn run_catalog(
    service: &dyn QueryService,
    conf: &AthenaConfig,
    catalog: &[CatalogEntry],
) -> Result<Vec<QueryReport>> {
    let timestamp = run_timestamp(Local::now());
    let mut reports = Vec::with_capacity(catalog.len());
    let mut failed = vec![];

    for query in catalog {
        info!("Running query {:?}", query.name);
        match run_query(service, conf, &timestamp, query).await {
            Ok(report) => {
                info!(
                    "[OK] Query {:?} ({}): {} polls, {} pages, {} rows",
                    report.name,
                    report.execution_id,
                    report.polls,
                    report.drain.pages,
                    report.drain.rows
                );
                reports.push(report);
            }
            Err(e) if conf.isolate_failures => {
                error!("Query {:?} failed: {}", query.name, e);
                failed.push(query.name.to_owned());
            }
            Err(e) => return Err(e),
        }
    }

    if failed.is_empty() {
        Ok(reports)
    } else {
        Err(QuarryError::Batch(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QUERY_CATALOG;
    use crate::service::ExecutionStatus::*;
    use crate::test_util::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_running_polls() -> Result<()> {
        let service = ScriptedService::new(vec![Running, Running, Succeeded], vec![]);
        let id = service.submit("db", "s3://out/", "SELECT 1").await?;

        let start = Instant::now();
        let polls = wait_for_completion(&service, &id, INTERVAL, 0).await?;

        assert_eq!(polls, 3);
        assert!(start.elapsed() >= INTERVAL * 2 && start.elapsed() < INTERVAL * 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failure_carries_reason() -> Result<()> {
        let reason = "SYNTAX_ERROR: line 1:8: Column 'x' cannot be resolved";
        let service = ScriptedService::new(vec![Running, Failed(Some(reason.to_owned()))], vec![]);
        let id = service.submit("db", "s3://out/", "SELECT x").await?;

        let err = wait_for_completion(&service, &id, INTERVAL, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::QueryFailed(_)));
        assert!(err.to_string().contains(reason));
        assert_eq!(service.status_calls(&id), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fails_without_sleeping() -> Result<()> {
        let service = ScriptedService::new(vec![Cancelled], vec![]);
        let id = service.submit("db", "s3://out/", "SELECT 1").await?;

        let start = Instant::now();
        let err = wait_for_completion(&service, &id, INTERVAL, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::QueryCancelled));
        assert!(start.elapsed() < INTERVAL);
        assert_eq!(service.status_calls(&id), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn queued_and_unknown_states_keep_polling() -> Result<()> {
        let service = ScriptedService::new(
            vec![Queued, Unknown("PAUSED".to_owned()), Running, Succeeded],
            vec![],
        );
        let id = service.submit("db", "s3://out/", "SELECT 1").await?;

        let start = Instant::now();
        assert_eq!(wait_for_completion(&service, &id, INTERVAL, 0).await?, 4);
        assert!(start.elapsed() >= INTERVAL * 3 && start.elapsed() < INTERVAL * 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn poll_ceiling() -> Result<()> {
        let service = ScriptedService::new(vec![Running], vec![]);
        let id = service.submit("db", "s3://out/", "SELECT 1").await?;

        let err = wait_for_completion(&service, &id, INTERVAL, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::PollTimeout(_, 3)));
        assert_eq!(service.status_calls(&id), 3);
        Ok(())
    }

    #[tokio::test]
    async fn drain_follows_tokens() -> Result<()> {
        let service = ScriptedService::new(
            vec![Succeeded],
            vec![page(3, Some("A")), page(2, Some("B")), page(1, None)],
        );

        let summary = drain_results(&service, "execution-0", None).await?;
        assert_eq!(summary, DrainSummary { pages: 3, rows: 6 });

        let tokens: Vec<_> = service
            .result_calls()
            .into_iter()
            .map(|call| call.next_token)
            .collect();
        assert_eq!(
            tokens,
            vec![None, Some("A".to_owned()), Some("B".to_owned())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn drain_single_page() -> Result<()> {
        let service = ScriptedService::new(vec![Succeeded], vec![page(1, None)]);
        let summary = drain_results(&service, "execution-0", Some(100)).await?;
        assert_eq!(summary, DrainSummary { pages: 1, rows: 1 });
        assert_eq!(
            service.result_calls(),
            vec![ResultCall {
                execution_id: "execution-0".to_owned(),
                next_token:   None,
                page_size:    Some(100),
            }]
        );
        Ok(())
    }

    #[test]
    fn output_location_layout() {
        let now = Local.with_ymd_and_hms(2021, 5, 1, 12, 34, 56).unwrap()
            + chrono::Duration::microseconds(789_012);
        let ts = run_timestamp(now);
        assert_eq!(ts, "2021-05-01T12:34:56.789012");
        assert_eq!(
            output_location("s3://bucket/results/", &ts, "Complete Table"),
            "s3://bucket/results/2021-05-01T12:34:56.789012/Complete Table/"
        );
        assert_eq!(
            output_location("s3://bucket", &ts, "q"),
            "s3://bucket/2021-05-01T12:34:56.789012/q/"
        );
    }

    #[test]
    fn runs_within_a_millisecond_get_distinct_timestamps() {
        let first = Local.with_ymd_and_hms(2021, 5, 1, 12, 34, 56).unwrap()
            + chrono::Duration::microseconds(891_100);
        let second = first + chrono::Duration::microseconds(400);
        assert_ne!(run_timestamp(first), run_timestamp(second));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_wait_never_drains() -> Result<()> {
        let service = ScriptedService::new(vec![Running], vec![page(1, None)]);
        let mut conf = test_config();
        conf.max_polls = 0;

        let run = run_query(&service, &conf, "2021-05-01T12:34:56.000000", &QUERY_CATALOG[0]);
        let res = tokio::time::timeout(Duration::from_secs(5), run).await;

        assert!(res.is_err());
        assert_eq!(service.submissions().len(), 1);
        assert!(service.status_calls("execution-0") > 1);
        assert!(service.result_calls().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_submits_each_query_once() -> Result<()> {
        let service = ScriptedService::new(vec![Running, Succeeded], vec![page(1, None)]);
        let mut conf = test_config();
        conf.page_size = Some(250);

        let reports = run_catalog(&service, &conf, QUERY_CATALOG).await?;
        assert_eq!(reports.len(), QUERY_CATALOG.len());

        let submissions = service.submissions();
        assert_eq!(submissions.len(), QUERY_CATALOG.len());
        for (submission, query) in submissions.iter().zip(QUERY_CATALOG) {
            assert_eq!(submission.sql, query.sql);
            assert_eq!(submission.database, "invoice_db");
            assert!(submission.output_location.starts_with("s3://quarry-test/"));
            assert!(submission
                .output_location
                .ends_with(&format!("/{}/", query.name)));
        }

        let locations: HashSet<_> = submissions.iter().map(|s| &s.output_location).collect();
        assert_eq!(locations.len(), submissions.len());

        assert!(reports.iter().all(|r| r.polls == 2 && r.drain.pages == 1));

        let calls = service.result_calls();
        assert_eq!(calls.len(), QUERY_CATALOG.len());
        assert!(calls.iter().all(|c| c.page_size == Some(250)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_aborts_batch() -> Result<()> {
        let service = ScriptedService::new(vec![Succeeded], vec![page(1, None)])
            .with_statuses_for(QUERY_CATALOG[1].sql, vec![Cancelled]);
        let conf = test_config();

        let err = run_catalog(&service, &conf, QUERY_CATALOG)
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::QueryCancelled));
        assert_eq!(service.submissions().len(), 2);
        // Only the first query reached the drain step.
        assert_eq!(service.result_calls().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn submission_error_aborts_batch() -> Result<()> {
        let service = ScriptedService::new(vec![Succeeded], vec![page(1, None)])
            .with_failing_submit(QUERY_CATALOG[0].sql);
        let conf = test_config();

        let err = run_catalog(&service, &conf, QUERY_CATALOG)
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::AWS(_)));
        assert!(service.submissions().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn isolated_failures_run_remaining_queries() -> Result<()> {
        let service = ScriptedService::new(vec![Succeeded], vec![page(1, None)])
            .with_statuses_for(
                QUERY_CATALOG[0].sql,
                vec![Running, Failed(Some("HIVE_CURSOR_ERROR".to_owned()))],
            )
            .with_failing_submit(QUERY_CATALOG[2].sql);
        let mut conf = test_config();
        conf.isolate_failures = true;

        match run_catalog(&service, &conf, QUERY_CATALOG).await {
            Err(QuarryError::Batch(names)) => assert_eq!(
                names,
                vec![QUERY_CATALOG[0].name.to_owned(), QUERY_CATALOG[2].name.to_owned()]
            ),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(service.submissions().len(), 2);
        assert_eq!(service.result_calls().len(), 1);
        Ok(())
    }
}
