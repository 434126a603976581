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

//! Athena settings of the Quarry function.

use crate::configs::QUARRY_CONF;
use crate::error::{QuarryError, Result};
use humantime::parse_duration;
use ini::Ini;
use rusoto_core::Region;
use std::str::FromStr;
use std::time::Duration;

/// The largest page Athena returns from `GetQueryResults`.
pub const ATHENA_MAX_PAGE_SIZE: i64 = 1000;

/// Athena query configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AthenaConfig {
    /// The AWS region of the Athena service.
    pub region:           Region,
    /// The database the catalog queries run against.
    pub database:         String,
    /// The S3 prefix under which Athena writes query results, e.g.
    /// `s3://bucket/results/`. Always ends with `/`.
    pub output_bucket:    String,
    /// The fixed delay between two status polls of the same execution.
    pub poll_interval:    Duration,
    /// The maximum number of status polls per execution. `0` polls until
    /// the execution reaches a terminal state, however long that takes.
    pub max_polls:        usize,
    /// The number of rows per result page. `None` lets Athena use its
    /// maximum.
    pub page_size:        Option<i64>,
    /// If true, a failed query is logged and the remaining queries of the
    /// catalog still run. Otherwise the first failure aborts the batch.
    pub isolate_failures: bool,
}

impl AthenaConfig {
    /// Loads the configuration from the embedded settings and applies the
    /// `QUARRY_*` environment overrides.
    pub fn try_new() -> Result<Self> {
        Self::from_settings(&QUARRY_CONF, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from `conf`. `env` resolves environment
    /// overrides by variable name.
    pub fn from_settings<F>(conf: &Ini, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let section = conf
            .section(Some("athena"))
            .ok_or_else(|| QuarryError::Config("missing [athena] section".to_owned()))?;

        let setting = |key: &str, var: &str| -> Result<String> {
            env(var)
                .or_else(|| section.get(key).map(|v| v.to_owned()))
                .map(|v| v.trim().to_owned())
                .ok_or_else(|| QuarryError::Config(format!("missing setting: athena.{}", key)))
        };

        let region = setting("region", "QUARRY_ATHENA_REGION")?;
        let region = Region::from_str(&region)
            .map_err(|e| QuarryError::Config(format!("invalid region {}: {}", region, e)))?;

        let database = setting("database", "QUARRY_ATHENA_DATABASE")?;
        if database.is_empty() {
            return Err(QuarryError::Config("database must not be empty".to_owned()));
        }

        let mut output_bucket = setting("output_bucket", "QUARRY_ATHENA_OUTPUT_BUCKET")?;
        if !output_bucket.starts_with("s3://") {
            return Err(QuarryError::Config(format!(
                "output bucket must be an s3:// location, got {}",
                output_bucket
            )));
        }
        if !output_bucket.ends_with('/') {
            output_bucket.push('/');
        }

        let interval = setting("poll_interval", "QUARRY_POLL_INTERVAL")?;
        let poll_interval = parse_duration(&interval).map_err(|e| {
            QuarryError::Config(format!("invalid poll interval {}: {}", interval, e))
        })?;

        let polls = setting("max_polls", "QUARRY_MAX_POLLS")?;
        let max_polls = polls
            .parse::<usize>()
            .map_err(|e| QuarryError::Config(format!("invalid max polls {}: {}", polls, e)))?;

        let size = setting("page_size", "QUARRY_PAGE_SIZE")?;
        let page_size = match size.parse::<i64>() {
            Ok(0) => None,
            Ok(n) if (1..=ATHENA_MAX_PAGE_SIZE).contains(&n) => Some(n),
            _ => {
                return Err(QuarryError::Config(format!(
                    "page size must be between 0 and {}, got {}",
                    ATHENA_MAX_PAGE_SIZE, size
                )))
            }
        };

        let isolate = setting("isolate_failures", "QUARRY_ISOLATE_FAILURES")?;
        let isolate_failures = isolate.parse::<bool>().map_err(|e| {
            QuarryError::Config(format!("invalid isolate_failures {}: {}", isolate, e))
        })?;

        Ok(AthenaConfig {
            region,
            database,
            output_bucket,
            poll_interval,
            max_polls,
            page_size,
            isolate_failures,
        })
    }
}
