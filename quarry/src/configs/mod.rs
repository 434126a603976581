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

//! This module provides various default configurations for Quarry.

pub mod athena;
pub use athena::AthenaConfig;

use ini::Ini;
use lazy_static::lazy_static;
use log::warn;
use rusoto_athena::AthenaClient;
use rusoto_core::Region;
use tokio::sync::OnceCell;

lazy_static! {
    /// Global settings.
    pub static ref QUARRY_CONF: Ini = Ini::load_from_str(include_str!("../config.toml")).unwrap();

    /// The literal status code returned by a successful invocation.
    pub static ref QUARRY_SUCCESS_CODE: String = "200".to_string();

    /// Quarry Athena Client, shared by every invocation of the same execution
    /// environment. Built on first use from the region of the invocation's
    /// configuration.
    static ref QUARRY_ATHENA_CLIENT: OnceCell<(Region, AthenaClient)> = OnceCell::new();
}

/// Returns the Athena client of this execution environment, creating it for
/// `conf.region` on the first call.
pub async fn athena_client(conf: &AthenaConfig) -> &'static AthenaClient {
    let (region, client) = QUARRY_ATHENA_CLIENT
        .get_or_init(|| async { (conf.region.clone(), AthenaClient::new(conf.region.clone())) })
        .await;
    if *region != conf.region {
        warn!(
            "Athena client is bound to {:?}, ignoring configured region {:?}",
            region, conf.region
        );
    }
    client
}
