// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error types for ingestion, merge and query operations
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Filter token validation
    #[error("invalid date format for {field}: {value:?} (expected YYYY-MM-DD HH:MM:SS)")]
    InvalidDateFormat { field: &'static str, value: String },

    #[error("invalid identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("invalid group-by flag {0:?} (expected true or false)")]
    InvalidFlag(String),

    #[error("invalid taxi category {0:?} (expected yellow, green, both or *)")]
    InvalidCategory(String),

    #[error("expected {expected} filter tokens, found {found}")]
    WrongArity { expected: usize, found: usize },

    // Ingestion
    #[error("source for partition {partition} is unreadable: {reason}")]
    SourceUnreadable { partition: String, reason: String },

    #[error("source for partition {partition} does not match the trip schema, missing: {}", .missing.join(", "))]
    SchemaMismatch {
        partition: String,
        missing: Vec<String>,
    },

    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    #[error("partition {0} is already being loaded")]
    PartitionBusy(String),

    // Merge
    #[error("partition {partition} is unavailable: {reason}")]
    PartitionUnavailable { partition: String, reason: String },

    // Query
    #[error("query execution failed: {0}")]
    QueryExecution(#[source] duckdb::Error),

    #[error("store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("unsupported query parameter: {0}")]
    UnsupportedParameter(String),

    // Plumbing
    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn source_unreadable(partition: &str, reason: impl std::fmt::Display) -> Self {
        Error::SourceUnreadable {
            partition: partition.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn partition_unavailable(partition: &str, reason: impl std::fmt::Display) -> Self {
        Error::PartitionUnavailable {
            partition: partition.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Caller mistakes in the filter tokens; reported immediately, never retried.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidDateFormat { .. }
                | Error::InvalidIdentifier { .. }
                | Error::InvalidFlag(_)
                | Error::InvalidCategory(_)
                | Error::WrongArity { .. }
        )
    }
}
