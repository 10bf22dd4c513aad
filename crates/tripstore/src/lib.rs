// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Partitioned trip-record store.
//!
//! Source Parquet files are loaded one per partition into their own DuckDB
//! store, consolidated into a unified store, and queried with parameterized
//! aggregations.

pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod labels;
pub mod loader;
pub mod merge;
pub mod query;
pub mod registry;
pub mod schema;
pub mod store;

pub use cancel::CancelFlag;
pub use config::StoreLayout;
pub use error::{Error, Result};
pub use filter::{Constraint, FilterSpec};
pub use ingest::{IngestOptions, IngestReport, ingest};
pub use loader::{LoadOutcome, PartitionLoader};
pub use merge::{MergeConsolidator, MergeReport};
pub use query::{AggregationQuery, AggregationRow, QueryTarget};
pub use registry::{LoadStatus, PartitionEntry, PartitionRegistry};
pub use schema::TaxiType;
