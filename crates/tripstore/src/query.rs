// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Aggregation query compiler and executor.
//!
//! A [`FilterSpec`] compiles to exactly one statement. Only constrained
//! fields contribute a predicate, and every value travels as a bound
//! parameter. `sea-query` renders Postgres-style `$n` placeholders, which
//! DuckDB accepts, and its values are converted to DuckDB values here.

use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{Connection, Row, params_from_iter};
use sea_query::{Alias, Asterisk, Expr, Func, Iden, Order, PostgresQueryBuilder, Query, Value};
use serde::Serialize;

use crate::config::StoreLayout;
use crate::error::{Error, Result};
use crate::filter::{Constraint, FilterSpec};
use crate::registry::{LoadStatus, PartitionRegistry};
use crate::store;

#[derive(Iden)]
enum Trips {
    Table,
    PaymentType,
    PickupDatetime,
    DropoffDatetime,
    #[iden = "pu_location_id"]
    PuLocationId,
    #[iden = "do_location_id"]
    DoLocationId,
    VendorId,
    TaxiType,
    FareAmount,
    TollsAmount,
}

const PAYMENT_TYPE: &str = "payment_type";
const TRIP_COUNT: &str = "trip_count";
const MIN_FARE: &str = "min_fare";
const MAX_FARE: &str = "max_fare";
const TOTAL_FARE: &str = "total_fare";
const TOTAL_TOLL_FARE: &str = "total_toll_fare";

/// Which store a query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryTarget {
    #[default]
    Unified,
    Partition(String),
}

/// One output row. `payment_type` is set only for grouped queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<i32>,
    pub trip_count: i64,
    pub min_fare: Option<f64>,
    pub max_fare: Option<f64>,
    pub total_fare: Option<f64>,
    pub total_toll_fare: Option<f64>,
}

/// A compiled, parameterized aggregation statement.
#[derive(Debug, Clone)]
pub struct AggregationQuery {
    sql: String,
    params: Vec<DuckValue>,
    group_by_payment: bool,
    empty_range: bool,
}

impl AggregationQuery {
    pub fn compile(spec: &FilterSpec) -> Result<Self> {
        let mut select = Query::select();

        if spec.group_by_payment() {
            select.column(Trips::PaymentType);
        }
        select
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new(TRIP_COUNT))
            .expr_as(Func::min(Expr::col(Trips::FareAmount)), Alias::new(MIN_FARE))
            .expr_as(Func::max(Expr::col(Trips::FareAmount)), Alias::new(MAX_FARE))
            .expr_as(Func::sum(Expr::col(Trips::FareAmount)), Alias::new(TOTAL_FARE))
            .expr_as(Func::sum(Expr::col(Trips::TollsAmount)), Alias::new(TOTAL_TOLL_FARE))
            .from(Trips::Table);

        if let Constraint::Value(from) = spec.pickup_from() {
            select.and_where(Expr::col(Trips::PickupDatetime).gte(from));
        }
        if let Constraint::Value(until) = spec.dropoff_until() {
            select.and_where(Expr::col(Trips::DropoffDatetime).lte(until));
        }
        if let Constraint::Value(id) = spec.pickup_location() {
            select.and_where(Expr::col(Trips::PuLocationId).eq(id));
        }
        if let Constraint::Value(id) = spec.dropoff_location() {
            select.and_where(Expr::col(Trips::DoLocationId).eq(id));
        }
        if let Constraint::Value(id) = spec.vendor() {
            select.and_where(Expr::col(Trips::VendorId).eq(id));
        }
        if let Constraint::Value(taxi_type) = spec.taxi_type() {
            select.and_where(Expr::col(Trips::TaxiType).eq(taxi_type.as_str()));
        }

        if spec.group_by_payment() {
            select
                .group_by_col(Trips::PaymentType)
                .order_by(Trips::PaymentType, Order::Asc);
        }

        let (sql, values) = select.build(PostgresQueryBuilder);
        let params = values
            .0
            .into_iter()
            .map(to_duck_value)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sql,
            params,
            group_by_payment: spec.group_by_payment(),
            empty_range: spec.is_empty_range(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[DuckValue] {
        &self.params
    }

    pub fn is_empty_range(&self) -> bool {
        self.empty_range
    }

    /// Run against an open store. Engine failures become `QueryExecution`.
    pub fn run(&self, conn: &Connection) -> Result<Vec<AggregationRow>> {
        if self.empty_range {
            return Ok(Vec::new());
        }
        diagnostics::debug!("Aggregation SQL: {sql}", sql: self.sql.as_str());

        let mut stmt = conn.prepare(&self.sql).map_err(Error::QueryExecution)?;
        let grouped = self.group_by_payment;
        let rows = stmt
            .query_map(params_from_iter(self.params.iter()), |row| {
                read_row(row, grouped)
            })
            .map_err(Error::QueryExecution)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::QueryExecution)
    }
}

fn read_row(row: &Row<'_>, grouped: bool) -> duckdb::Result<AggregationRow> {
    Ok(AggregationRow {
        payment_type: if grouped {
            row.get(PAYMENT_TYPE)?
        } else {
            None
        },
        trip_count: row.get(TRIP_COUNT)?,
        min_fare: row.get(MIN_FARE)?,
        max_fare: row.get(MAX_FARE)?,
        total_fare: row.get(TOTAL_FARE)?,
        total_toll_fare: row.get(TOTAL_TOLL_FARE)?,
    })
}

fn to_duck_value(value: Value) -> Result<DuckValue> {
    match value {
        Value::BigInt(Some(v)) => Ok(DuckValue::BigInt(v)),
        Value::Int(Some(v)) => Ok(DuckValue::Int(v)),
        Value::String(Some(v)) => Ok(DuckValue::Text(*v)),
        Value::ChronoDateTime(Some(v)) => Ok(DuckValue::Timestamp(
            TimeUnit::Microsecond,
            v.and_utc().timestamp_micros(),
        )),
        other => Err(Error::UnsupportedParameter(format!("{other:?}"))),
    }
}

/// Compile and run `spec` against `target`, opening the store read-only.
pub fn execute(
    layout: &StoreLayout,
    registry: &PartitionRegistry,
    spec: &FilterSpec,
    target: &QueryTarget,
) -> Result<Vec<AggregationRow>> {
    let query = AggregationQuery::compile(spec)?;
    if query.is_empty_range() {
        diagnostics::debug!("Empty datetime range, skipping execution");
        return Ok(Vec::new());
    }

    let conn = match target {
        QueryTarget::Unified => store::open_read_only(&layout.unified_store())?,
        QueryTarget::Partition(id) => {
            let entry = registry
                .get(id)?
                .ok_or_else(|| Error::UnknownPartition(id.clone()))?;
            if entry.status != LoadStatus::Loaded {
                return Err(Error::partition_unavailable(
                    id,
                    format!("partition is {}", entry.status),
                ));
            }
            store::open_read_only(&entry.store).map_err(|e| match e {
                Error::StoreNotFound(_) => Error::partition_unavailable(id, "partition store is missing"),
                other => other,
            })?
        }
    };

    let rows = query.run(&conn)?;
    diagnostics::info!("Query returned {count} rows", count: rows.len());
    Ok(rows)
}
