// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::{Result, anyhow};
use arrow::util::pretty::pretty_format_batches;
use arrow_array::{ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use tripstore::labels::{payment_label, vendor_name};
use tripstore::{AggregationRow, Constraint, FilterSpec, QueryTarget};

use crate::common::{OutputFormat, PondContext};

/// Parse the seven filter tokens, run the aggregation and render the rows.
///
/// Token errors fail before the pond is touched.
pub async fn query_command<F>(
    ctx: &PondContext,
    tokens: &[String],
    partition: Option<String>,
    format: OutputFormat,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let spec = FilterSpec::parse(tokens)?;
    let layout = ctx.layout()?;
    let registry = tripstore::PartitionRegistry::open(layout.registry_path())?;
    let target = partition.map_or(QueryTarget::Unified, QueryTarget::Partition);
    let grouped = spec.group_by_payment();
    let vendor = spec.vendor();

    let rows = tokio::task::spawn_blocking(move || {
        tripstore::query::execute(&layout, &registry, &spec, &target)
    })
    .await
    .map_err(|e| anyhow!("query task failed: {e}"))??;

    let output = match format {
        OutputFormat::Table => {
            if let Constraint::Value(id) = vendor {
                handler(&format!("Vendor {id}: {}", vendor_name(id).unwrap_or("unknown")));
            }
            format_table(&rows, grouped)?
        }
        OutputFormat::Json => serde_json::to_string_pretty(&rows)?,
    };
    handler(&output);
    Ok(())
}

fn format_table(rows: &[AggregationRow], grouped: bool) -> Result<String> {
    if rows.is_empty() {
        return Ok("No matching trips".to_string());
    }

    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    if grouped {
        fields.push(Field::new("payment_type", DataType::Int32, true));
        columns.push(Arc::new(Int32Array::from(
            rows.iter().map(|r| r.payment_type).collect::<Vec<_>>(),
        )));
        fields.push(Field::new("payment", DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from(
            rows.iter().map(|r| payment_label(r.payment_type)).collect::<Vec<_>>(),
        )));
    }
    fields.push(Field::new("trip_count", DataType::Int64, false));
    columns.push(Arc::new(Int64Array::from(
        rows.iter().map(|r| r.trip_count).collect::<Vec<_>>(),
    )));
    let payloads = [
        ("min_fare", rows.iter().map(|r| r.min_fare).collect::<Vec<_>>()),
        ("max_fare", rows.iter().map(|r| r.max_fare).collect()),
        ("total_fare", rows.iter().map(|r| r.total_fare).collect()),
        ("total_toll_fare", rows.iter().map(|r| r.total_toll_fare).collect()),
    ];
    for (name, values) in payloads {
        fields.push(Field::new(name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(values)));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}
