// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures: small TLC-shaped Parquet files in a temporary pond.

use arrow_array::{ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, TimestampMicrosecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tripstore::{PartitionRegistry, StoreLayout};

/// 2025-06-01 00:00:00 UTC
pub const JUNE_FIRST_MICROS: i64 = 1_748_736_000_000_000;
const MINUTE_MICROS: i64 = 60_000_000;

pub struct TestPond {
    _dir: TempDir,
    pub layout: StoreLayout,
    pub registry: PartitionRegistry,
}

impl TestPond {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let layout = StoreLayout::new(dir.path());
        layout.ensure_dirs()?;
        let registry = PartitionRegistry::open(layout.registry_path())?;
        Ok(Self {
            _dir: dir,
            layout,
            registry,
        })
    }

    pub fn source_path(&self, partition: &str) -> PathBuf {
        self.layout.sources_dir().join(format!("{partition}.parquet"))
    }

    /// Write a yellow-taxi source with `rows` trips. Payment types cycle 1..=3,
    /// vendor is always 2 and locations start at 10.
    pub fn write_yellow(&self, partition: &str, rows: usize) -> anyhow::Result<PathBuf> {
        let path = self.source_path(partition);
        write_trips(&path, "tpep", rows, None)?;
        Ok(path)
    }

    pub fn write_green(&self, partition: &str, rows: usize) -> anyhow::Result<PathBuf> {
        let path = self.source_path(partition);
        write_trips(&path, "lpep", rows, None)?;
        Ok(path)
    }

    /// Write a yellow source that lacks one column.
    pub fn write_without(&self, partition: &str, rows: usize, column: &str) -> anyhow::Result<PathBuf> {
        let path = self.source_path(partition);
        write_trips(&path, "tpep", rows, Some(column))?;
        Ok(path)
    }
}

fn write_trips(path: &Path, prefix: &str, rows: usize, omit: Option<&str>) -> anyhow::Result<()> {
    let n = i64::try_from(rows)?;
    let pickups: Vec<i64> = (0..n).map(|i| JUNE_FIRST_MICROS + i * MINUTE_MICROS).collect();
    let dropoffs: Vec<i64> = pickups.iter().map(|p| p + 15 * MINUTE_MICROS).collect();
    let location = |offset: i32| -> Vec<i32> { (0..rows).map(|i| 10 + offset + (i % 5) as i32).collect() };

    let mut columns: Vec<(Field, ArrayRef)> = vec![
        (
            Field::new("VendorID", DataType::Int32, true),
            Arc::new(Int32Array::from(vec![2; rows])),
        ),
        (
            Field::new(
                format!("{prefix}_pickup_datetime"),
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Arc::new(TimestampMicrosecondArray::from(pickups)),
        ),
        (
            Field::new(
                format!("{prefix}_dropoff_datetime"),
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Arc::new(TimestampMicrosecondArray::from(dropoffs)),
        ),
        (
            Field::new("PULocationID", DataType::Int32, true),
            Arc::new(Int32Array::from(location(0))),
        ),
        (
            Field::new("DOLocationID", DataType::Int32, true),
            Arc::new(Int32Array::from(location(100))),
        ),
        (
            Field::new("payment_type", DataType::Int64, true),
            Arc::new(Int64Array::from((0..n).map(|i| i % 3 + 1).collect::<Vec<_>>())),
        ),
        (
            Field::new("fare_amount", DataType::Float64, true),
            Arc::new(Float64Array::from((0..rows).map(|i| 5.0 + i as f64).collect::<Vec<_>>())),
        ),
        (
            Field::new("tolls_amount", DataType::Float64, true),
            Arc::new(Float64Array::from(vec![1.5; rows])),
        ),
    ];
    if let Some(omit) = omit {
        columns.retain(|(field, _)| field.name() != omit);
    }

    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = columns.into_iter().unzip();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
