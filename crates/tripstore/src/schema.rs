// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The normalized `trips` table and the mapping of source files onto it.
//!
//! Yellow and green trip files differ only in the prefix of their timestamp
//! columns (`tpep_*` vs `lpep_*`); the prefix also decides the taxi type of
//! every row in the file. Source column names are matched without regard to
//! ASCII case because the published files are not consistent about it.

use arrow_schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::store::quote_ident;

/// Table name shared by partition stores and the unified store.
pub const TRIPS_TABLE: &str = "trips";

/// Column added to the unified store to trace each row to its partition.
pub const PARTITION_COLUMN: &str = "partition_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxiType {
    Yellow,
    Green,
}

impl TaxiType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaxiType::Yellow => "yellow",
            TaxiType::Green => "green",
        }
    }

    /// Case-insensitive parse of `yellow` / `green`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("yellow") {
            Some(TaxiType::Yellow)
        } else if value.eq_ignore_ascii_case("green") {
            Some(TaxiType::Green)
        } else {
            None
        }
    }

    fn timestamp_prefix(self) -> &'static str {
        match self {
            TaxiType::Yellow => "tpep",
            TaxiType::Green => "lpep",
        }
    }
}

impl fmt::Display for TaxiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum SourceColumn {
    Named(&'static str),
    Pickup,
    Dropoff,
    TaxiType,
}

#[derive(Debug)]
struct TripColumn {
    name: &'static str,
    sql_type: &'static str,
    source: SourceColumn,
    required: bool,
}

const fn col(
    name: &'static str,
    sql_type: &'static str,
    source: SourceColumn,
    required: bool,
) -> TripColumn {
    TripColumn {
        name,
        sql_type,
        source,
        required,
    }
}

const TRIP_COLUMNS: &[TripColumn] = &[
    col("vendor_id", "INTEGER", SourceColumn::Named("VendorID"), true),
    col("pickup_datetime", "TIMESTAMP", SourceColumn::Pickup, true),
    col("dropoff_datetime", "TIMESTAMP", SourceColumn::Dropoff, true),
    col("passenger_count", "INTEGER", SourceColumn::Named("passenger_count"), false),
    col("trip_distance", "DOUBLE", SourceColumn::Named("trip_distance"), false),
    col("rate_code_id", "INTEGER", SourceColumn::Named("RatecodeID"), false),
    col("pu_location_id", "INTEGER", SourceColumn::Named("PULocationID"), true),
    col("do_location_id", "INTEGER", SourceColumn::Named("DOLocationID"), true),
    col("payment_type", "INTEGER", SourceColumn::Named("payment_type"), true),
    col("fare_amount", "DOUBLE", SourceColumn::Named("fare_amount"), true),
    col("extra", "DOUBLE", SourceColumn::Named("extra"), false),
    col("mta_tax", "DOUBLE", SourceColumn::Named("mta_tax"), false),
    col("tip_amount", "DOUBLE", SourceColumn::Named("tip_amount"), false),
    col("tolls_amount", "DOUBLE", SourceColumn::Named("tolls_amount"), true),
    col("improvement_surcharge", "DOUBLE", SourceColumn::Named("improvement_surcharge"), false),
    col("total_amount", "DOUBLE", SourceColumn::Named("total_amount"), false),
    col("congestion_surcharge", "DOUBLE", SourceColumn::Named("congestion_surcharge"), false),
    col("taxi_type", "VARCHAR", SourceColumn::TaxiType, true),
];

/// `CREATE TABLE` for the trips table of a partition store.
pub fn partition_table_ddl() -> String {
    table_ddl(false)
}

/// `CREATE TABLE` for the trips table of the unified store.
pub fn unified_table_ddl() -> String {
    table_ddl(true)
}

fn table_ddl(with_partition: bool) -> String {
    let mut columns: Vec<String> = TRIP_COLUMNS
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect();
    if with_partition {
        columns.push(format!("{PARTITION_COLUMN} VARCHAR NOT NULL"));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {TRIPS_TABLE} ({})",
        columns.join(", ")
    )
}

/// Comma-separated normalized column names, in table order.
pub fn trip_column_list() -> String {
    TRIP_COLUMNS
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// How one source file's columns map onto the trips table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMapping {
    taxi_type: TaxiType,
    // Actual source column name per trip column; `None` loads as NULL.
    columns: Vec<Option<String>>,
}

impl SourceMapping {
    /// Resolve a source schema, failing with `SchemaMismatch` when a
    /// required column cannot be found.
    pub fn resolve(partition: &str, schema: &Schema) -> Result<Self> {
        let by_lower: HashMap<String, &str> = schema
            .fields()
            .iter()
            .map(|f| (f.name().to_ascii_lowercase(), f.name().as_str()))
            .collect();
        let lookup = |name: &str| by_lower.get(&name.to_ascii_lowercase()).map(|s| s.to_string());

        let taxi_type = [TaxiType::Yellow, TaxiType::Green]
            .into_iter()
            .find(|t| lookup(&format!("{}_pickup_datetime", t.timestamp_prefix())).is_some());

        let Some(taxi_type) = taxi_type else {
            return Err(Error::SchemaMismatch {
                partition: partition.to_string(),
                missing: vec!["tpep_pickup_datetime or lpep_pickup_datetime".to_string()],
            });
        };

        let prefix = taxi_type.timestamp_prefix();
        let mut missing = Vec::new();
        let mut columns = Vec::with_capacity(TRIP_COLUMNS.len());

        for column in TRIP_COLUMNS {
            let wanted = match column.source {
                SourceColumn::Named(name) => name.to_string(),
                SourceColumn::Pickup => format!("{prefix}_pickup_datetime"),
                SourceColumn::Dropoff => format!("{prefix}_dropoff_datetime"),
                SourceColumn::TaxiType => {
                    columns.push(None);
                    continue;
                }
            };
            let found = lookup(&wanted);
            if found.is_none() && column.required {
                missing.push(wanted);
            }
            columns.push(found);
        }

        if !missing.is_empty() {
            return Err(Error::SchemaMismatch {
                partition: partition.to_string(),
                missing,
            });
        }

        Ok(Self { taxi_type, columns })
    }

    pub fn taxi_type(&self) -> TaxiType {
        self.taxi_type
    }

    /// Select list producing the trips columns, in table order, from the
    /// source relation.
    pub fn select_list(&self) -> String {
        TRIP_COLUMNS
            .iter()
            .zip(&self.columns)
            .map(|(column, source)| match (column.source, source) {
                (SourceColumn::TaxiType, _) => {
                    format!("'{}' AS {}", self.taxi_type.as_str(), column.name)
                }
                (_, Some(source)) => format!(
                    "CAST({} AS {}) AS {}",
                    quote_ident(source),
                    column.sql_type,
                    column.name
                ),
                (_, None) => format!("CAST(NULL AS {}) AS {}", column.sql_type, column.name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
