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

//! The main entry point for the Athena query lambda function.

use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{service_fn, LambdaEvent};
use log::info;
use quarry::prelude::*;

#[cfg(feature = "snmalloc")]
#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Logs the objects whose storage events triggered this invocation. The
/// event carries nothing else the queries need.
fn log_trigger(event: &S3Event) {
    for record in &event.records {
        info!(
            "Triggered by {} on s3://{}/{}",
            record.event_name.as_deref().unwrap_or_default(),
            record.s3.bucket.name.as_deref().unwrap_or_default(),
            record.s3.object.key.as_deref().unwrap_or_default()
        );
    }
}

/// Runs `catalog` and returns the status code of a successful invocation.
/// Any error escapes to the Lambda runtime.
async fn invoke(
    service: &dyn QueryService,
    conf: &AthenaConfig,
    catalog: &[CatalogEntry],
) -> Result<String> {
    let reports = run_catalog(service, conf, catalog).await?;
    info!("[OK] Ran {} queries on {}.", reports.len(), conf.database);
    Ok(QUARRY_SUCCESS_CODE.clone())
}

async fn handler(event: LambdaEvent<S3Event>) -> Result<String> {
    info!("Request id: {}", event.context.request_id);
    log_trigger(&event.payload);

    let conf = AthenaConfig::try_new()?;
    let service = AthenaService::new(athena_client(&conf).await.clone());
    invoke(&service, &conf, QUERY_CATALOG).await
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    lambda_runtime::run(service_fn(handler)).await?;
    Ok(())
}
