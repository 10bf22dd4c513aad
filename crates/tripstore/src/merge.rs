// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Merge consolidator - folds LOADED partition stores into the unified store.
//!
//! The unified store holds the `trips` table (with a `partition_id` column)
//! and the `merge_watermark` table. A partition's rows and its watermark row
//! are always written in the same transaction, so after any interruption the
//! watermark tells exactly which partitions are fully present.
//!
//! One pass:
//! 1. prune partitions in the watermark that are no longer LOADED
//! 2. for every LOADED partition whose source hash differs from (or is
//!    missing in) the watermark, attach its store read-only and copy its rows
//! 3. skip the rest

use chrono::Utc;
use duckdb::{Connection, params};
use std::collections::{BTreeMap, BTreeSet};

use crate::cancel::CancelFlag;
use crate::config::StoreLayout;
use crate::error::{Error, Result};
use crate::registry::{LoadStatus, PartitionEntry, PartitionRegistry};
use crate::schema::{self, PARTITION_COLUMN, TRIPS_TABLE};
use crate::store::{self, quote_path};

const WATERMARK_TABLE: &str = "merge_watermark";
const SOURCE_ALIAS: &str = "merge_source";

/// Watermark record for one merged partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkEntry {
    pub partition: String,
    pub source_sha256: String,
    pub row_count: u64,
    pub merged_at: i64, // Microseconds since epoch
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<(String, u64)>,
    pub skipped: Vec<String>,
    pub pruned: Vec<String>,
    pub unavailable: Vec<Error>,
    /// Partitions left for a later pass because the run was cancelled.
    pub not_started: Vec<String>,
}

impl MergeReport {
    pub fn has_failures(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MergeConsolidator {
    layout: StoreLayout,
    registry: PartitionRegistry,
}

impl MergeConsolidator {
    pub fn new(layout: StoreLayout, registry: PartitionRegistry) -> Self {
        Self { layout, registry }
    }

    /// Run one merge pass.
    pub fn merge(&self, cancel: &CancelFlag) -> Result<MergeReport> {
        let conn = store::open_read_write(&self.layout.unified_store())?;
        init_unified(&conn)?;

        let watermark: BTreeMap<String, WatermarkEntry> = read_watermark_from(&conn)?
            .into_iter()
            .map(|w| (w.partition.clone(), w))
            .collect();
        let loaded = self.registry.list_by_status(LoadStatus::Loaded)?;
        let loaded_ids: BTreeSet<&str> = loaded.iter().map(|e| e.id.as_str()).collect();

        let mut report = MergeReport::default();

        for partition in watermark.keys() {
            if !loaded_ids.contains(partition.as_str()) {
                prune_partition(&conn, partition)?;
                diagnostics::info!("Pruned partition {partition} from unified store", partition: partition.as_str());
                report.pruned.push(partition.clone());
            }
        }

        for entry in &loaded {
            if cancel.is_cancelled() {
                report.not_started.push(entry.id.clone());
                continue;
            }
            let reflected = watermark
                .get(&entry.id)
                .is_some_and(|w| Some(&w.source_sha256) == entry.source_sha256.as_ref());
            if reflected {
                diagnostics::debug!("Partition {partition} already merged", partition: entry.id.as_str());
                report.skipped.push(entry.id.clone());
                continue;
            }

            match merge_partition(&conn, entry) {
                Ok(rows) => {
                    diagnostics::info!(
                        "Merged partition {partition} with {rows} rows",
                        partition: entry.id.as_str(),
                        rows
                    );
                    report.merged.push((entry.id.clone(), rows));
                }
                Err(err @ Error::PartitionUnavailable { .. }) => {
                    diagnostics::warn!(
                        "Excluding partition from merge: {error}",
                        error: err.to_string()
                    );
                    report.unavailable.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        conn.execute_batch("CHECKPOINT")?;
        Ok(report)
    }
}

/// Read the merge watermark of a unified store. A store that does not exist
/// yet has an empty watermark.
pub fn read_watermark(layout: &StoreLayout) -> Result<Vec<WatermarkEntry>> {
    match store::open_read_only(&layout.unified_store()) {
        Ok(conn) => read_watermark_from(&conn),
        Err(Error::StoreNotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn init_unified(conn: &Connection) -> Result<()> {
    conn.execute_batch(&schema::unified_table_ddl())?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {WATERMARK_TABLE} (
            partition_id VARCHAR PRIMARY KEY,
            source_sha256 VARCHAR NOT NULL,
            row_count BIGINT NOT NULL,
            merged_at BIGINT NOT NULL
        )"
    ))?;
    Ok(())
}

fn read_watermark_from(conn: &Connection) -> Result<Vec<WatermarkEntry>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
        params![WATERMARK_TABLE],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT partition_id, source_sha256, row_count, merged_at FROM {WATERMARK_TABLE} ORDER BY partition_id"
    ))?;
    let rows = stmt.query_map([], |row| {
        let row_count: i64 = row.get(2)?;
        Ok(WatermarkEntry {
            partition: row.get(0)?,
            source_sha256: row.get(1)?,
            row_count: u64::try_from(row_count).unwrap_or_default(),
            merged_at: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn prune_partition(conn: &Connection, partition: &str) -> Result<()> {
    store::in_transaction(conn, |c| {
        delete_partition_rows(c, partition)?;
        c.execute(
            &format!("DELETE FROM {WATERMARK_TABLE} WHERE partition_id = ?"),
            params![partition],
        )?;
        Ok(())
    })
}

fn delete_partition_rows(conn: &Connection, partition: &str) -> Result<usize> {
    Ok(conn.execute(
        &format!("DELETE FROM {TRIPS_TABLE} WHERE {PARTITION_COLUMN} = ?"),
        params![partition],
    )?)
}

/// Copy one partition into the unified store in a single transaction.
fn merge_partition(conn: &Connection, entry: &PartitionEntry) -> Result<u64> {
    let partition = entry.id.as_str();
    if !entry.store.is_file() {
        return Err(Error::partition_unavailable(partition, "partition store is missing"));
    }
    let (Some(expected), Some(sha256)) = (entry.row_count, entry.source_sha256.as_deref()) else {
        return Err(Error::partition_unavailable(partition, "registry entry has no load record"));
    };

    conn.execute_batch(&format!(
        "ATTACH {} AS {SOURCE_ALIAS} (READ_ONLY)",
        quote_path(&entry.store)
    ))
    .map_err(|e| Error::partition_unavailable(partition, e))?;

    let result = store::in_transaction(conn, |c| {
        delete_partition_rows(c, partition)?;

        let columns = schema::trip_column_list();
        let inserted = c
            .execute(
                &format!(
                    "INSERT INTO {TRIPS_TABLE} ({columns}, {PARTITION_COLUMN}) \
                     SELECT {columns}, CAST(? AS VARCHAR) FROM {SOURCE_ALIAS}.{TRIPS_TABLE}"
                ),
                params![partition],
            )
            .map_err(|e| Error::partition_unavailable(partition, e))?;
        let inserted = inserted as u64;
        if inserted != expected {
            return Err(Error::partition_unavailable(
                partition,
                format!("store holds {inserted} rows, registry recorded {expected}"),
            ));
        }

        c.execute(
            &format!("DELETE FROM {WATERMARK_TABLE} WHERE partition_id = ?"),
            params![partition],
        )?;
        c.execute(
            &format!(
                "INSERT INTO {WATERMARK_TABLE} (partition_id, source_sha256, row_count, merged_at) \
                 VALUES (?, ?, ?, ?)"
            ),
            params![partition, sha256, inserted as i64, Utc::now().timestamp_micros()],
        )?;
        Ok(inserted)
    });

    detach_source(conn, partition);
    result
}

/// Detach the partition store. The partition's transaction has already
/// committed or rolled back, so a failure here is only logged.
fn detach_source(conn: &Connection, partition: &str) {
    if let Err(e) = conn.execute_batch(&format!("DETACH {SOURCE_ALIAS}")) {
        diagnostics::warn!(
            "Failed to detach store of partition {partition}: {error}",
            partition,
            error: e.to_string()
        );
    }
}
