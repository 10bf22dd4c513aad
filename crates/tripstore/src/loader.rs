// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Partition loader - bulk loads one source file into its partition store.
//!
//! A load never touches the live partition store until it has fully
//! succeeded: rows go into a scratch store in one transaction, the scratch
//! store is checkpointed and closed, and only then renamed over the live
//! store. The registry moves to LOADED after the rename. A failed first load
//! marks the partition FAILED; a failed reload of a LOADED partition leaves
//! both its store and its registry entry untouched.

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

use crate::config::StoreLayout;
use crate::error::{Error, Result};
use crate::registry::{LoadClaim, LoadStatus, PartitionEntry, PartitionRegistry, Transition};
use crate::schema::{self, SourceMapping, TRIPS_TABLE};
use crate::store::{self, quote_path};

/// Result of one successful loader invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: u64 },
    /// Already LOADED from an identical source; nothing was written.
    Skipped { rows: u64 },
}

impl LoadOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            LoadOutcome::Loaded { rows } | LoadOutcome::Skipped { rows } => *rows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartitionLoader {
    layout: StoreLayout,
    registry: PartitionRegistry,
}

impl PartitionLoader {
    pub fn new(layout: StoreLayout, registry: PartitionRegistry) -> Self {
        Self { layout, registry }
    }

    /// Load one registered partition.
    ///
    /// With `force`, a LOADED partition is reloaded even if its source is
    /// unchanged; the reload still replaces the store atomically.
    ///
    /// A failed reload of a LOADED partition rolls back: the live store and
    /// the registry entry keep their previous contents and only the returned
    /// error reports the failure. Any other failure marks the partition FAILED.
    pub fn load(&self, partition: &str, force: bool) -> Result<LoadOutcome> {
        let claim = self.registry.claim(partition)?;
        let entry = self
            .registry
            .get(partition)?
            .ok_or_else(|| Error::UnknownPartition(partition.to_string()))?;

        match self.load_claimed(&claim, &entry, force) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let _ = remove_store_files(&self.layout.partition_scratch(partition));
                if entry.status == LoadStatus::Loaded {
                    diagnostics::warn!(
                        "Reload of partition {partition} failed, keeping previous load: {error}",
                        partition,
                        error: err.to_string()
                    );
                } else {
                    diagnostics::error!(
                        "Failed to load partition {partition}: {error}",
                        partition,
                        error: err.to_string()
                    );
                    claim.set_status(Transition::Failed {
                        error: err.to_string(),
                    })?;
                }
                Err(err)
            }
        }
    }

    fn load_claimed(
        &self,
        claim: &LoadClaim,
        entry: &PartitionEntry,
        force: bool,
    ) -> Result<LoadOutcome> {
        let partition = claim.id();

        // Previous load that an unchanged source lets us keep
        let previous = match (&entry.source_sha256, entry.row_count) {
            (Some(sha256), Some(rows))
                if !force && entry.status == LoadStatus::Loaded && entry.store.exists() =>
            {
                Some((sha256.as_str(), rows))
            }
            _ => None,
        };
        if let Some((_, rows)) = previous {
            if !entry.source.exists() {
                diagnostics::debug!(
                    "Source of loaded partition {partition} is gone, keeping its store",
                    partition
                );
                return Ok(LoadOutcome::Skipped { rows });
            }
        }

        let sha256 = hash_source(partition, &entry.source)?;
        if let Some((prev, rows)) = previous {
            if prev == sha256 {
                diagnostics::debug!(
                    "Partition {partition} already loaded from identical source",
                    partition
                );
                return Ok(LoadOutcome::Skipped { rows });
            }
        }

        let mapping = inspect_source(partition, &entry.source)?;
        let rows = self.bulk_load(partition, &entry.source, &entry.store, &mapping)?;

        claim.set_status(Transition::Loaded {
            row_count: rows,
            source_sha256: sha256,
        })?;
        diagnostics::info!(
            "Loaded partition {partition} ({taxi_type}) with {rows} rows",
            partition,
            taxi_type: mapping.taxi_type().as_str(),
            rows
        );
        Ok(LoadOutcome::Loaded { rows })
    }

    fn bulk_load(
        &self,
        partition: &str,
        source: &Path,
        store_path: &Path,
        mapping: &SourceMapping,
    ) -> Result<u64> {
        std::fs::create_dir_all(self.layout.partitions_dir())?;
        let scratch = self.layout.partition_scratch(partition);
        remove_store_files(&scratch)?;

        let rows = {
            let conn = store::open_read_write(&scratch)?;
            let insert = format!(
                "INSERT INTO {TRIPS_TABLE} ({}) SELECT {} FROM read_parquet({})",
                schema::trip_column_list(),
                mapping.select_list(),
                quote_path(source)
            );
            diagnostics::debug!("Bulk load SQL: {sql}", sql: insert.as_str());

            let inserted = store::in_transaction(&conn, |c| {
                c.execute_batch(&schema::partition_table_ddl())?;
                c.execute(&insert, [])
                    .map_err(|e| Error::source_unreadable(partition, e))
            })?;
            conn.execute_batch("CHECKPOINT")?;

            let stored = store::count_trips(&conn, "main")?;
            if stored != inserted as u64 {
                return Err(Error::source_unreadable(
                    partition,
                    format!("inserted {inserted} rows but store holds {stored}"),
                ));
            }
            stored
        };

        std::fs::rename(&scratch, store_path)?;
        Ok(rows)
    }
}

/// SHA-256 of the source file, hex encoded.
fn hash_source(partition: &str, source: &Path) -> Result<String> {
    let mut file = File::open(source).map_err(|e| Error::source_unreadable(partition, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| Error::source_unreadable(partition, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Read the Parquet footer and resolve its schema onto the trips table.
fn inspect_source(partition: &str, source: &Path) -> Result<SourceMapping> {
    let file = File::open(source).map_err(|e| Error::source_unreadable(partition, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::source_unreadable(partition, e))?;
    SourceMapping::resolve(partition, builder.schema())
}

fn remove_store_files(path: &Path) -> Result<()> {
    let wal = path.with_extension(format!(
        "{}.wal",
        path.extension().map(|e| e.to_string_lossy()).unwrap_or_default()
    ));
    for p in [path, wal.as_path()] {
        match std::fs::remove_file(p) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
