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

#![warn(missing_docs, clippy::needless_borrow)]
// Clippy lints, some should be disabled incrementally
#![allow(
    clippy::module_inception,
    clippy::needless_update,
    clippy::new_without_default,
    clippy::upper_case_acronyms
)]

//! Quarry runs a fixed catalog of SQL queries on Amazon Athena from a cloud
//! function: each query is submitted, polled until it is terminal, and its
//! result set is paged through.

pub mod aws;
pub mod catalog;
pub mod configs;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod service;
pub mod test_util;
