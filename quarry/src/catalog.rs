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

//! The fixed set of named queries every invocation runs.

/// A named SQL query of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The query name. Also used as a path segment of the output location.
    pub name: &'static str,
    /// The SQL text submitted to Athena.
    pub sql:  &'static str,
}

/// The query catalog, in execution order.
pub static QUERY_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "Complete Table",
        sql:  "SELECT * FROM invoice_details",
    },
    CatalogEntry {
        name: "No of organizationId's",
        sql:  "SELECT COUNT(Distinct(organizationId)) AS no_of_organizationIds FROM invoice_details",
    },
    CatalogEntry {
        name: "No of Distinct country's",
        sql:  "SELECT COUNT(Distinct(country)) AS no_of_countries FROM invoice_details",
    },
];
