// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Ingestion runner - discovers source files and loads partitions in parallel.
//!
//! Each partition load runs on the blocking pool; a semaphore bounds how many
//! run at once. One partition's failure never stops the others: every
//! requested partition gets an outcome in the report.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::CancelFlag;
use crate::config::StoreLayout;
use crate::error::{Error, Result};
use crate::loader::{LoadOutcome, PartitionLoader};
use crate::registry::PartitionRegistry;

const SOURCE_EXTENSION: &str = "parquet";

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Restrict the run to these partition ids; empty means all registered.
    pub partitions: Vec<String>,
    pub force: bool,
    pub jobs: usize,
    pub cancel: CancelFlag,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            force: false,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug)]
pub struct PartitionReport {
    pub partition: String,
    pub outcome: Result<LoadOutcome>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub partitions: Vec<PartitionReport>,
    /// Partitions not attempted because the run was cancelled.
    pub not_started: Vec<String>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        self.partitions.iter().any(|p| p.outcome.is_err())
    }

    pub fn loaded_rows(&self) -> u64 {
        self.partitions
            .iter()
            .filter_map(|p| p.outcome.as_ref().ok())
            .map(LoadOutcome::rows)
            .sum()
    }
}

/// A source file found on disk and the partition id derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub partition: String,
    pub path: PathBuf,
}

/// List `*.parquet` files in `dir`, ordered by partition id. The id is the
/// file stem, e.g. `yellow_tripdata_2025-06`.
pub fn discover_sources(dir: &Path) -> Result<Vec<DiscoveredSource>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_source = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION));
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if is_source {
            found.push(DiscoveredSource {
                partition: stem.to_string(),
                path,
            });
        }
    }
    found.sort_by(|a, b| a.partition.cmp(&b.partition));
    Ok(found)
}

/// Register every source in the layout's sources directory.
pub fn register_sources(layout: &StoreLayout, registry: &PartitionRegistry) -> Result<Vec<String>> {
    layout.ensure_dirs()?;
    let sources = discover_sources(&layout.sources_dir())?;
    let mut ids = Vec::with_capacity(sources.len());
    for source in sources {
        registry.register(
            &source.partition,
            &source.path,
            &layout.partition_store(&source.partition),
        )?;
        ids.push(source.partition);
    }
    Ok(ids)
}

/// Run one load, turning a panic into that partition's failure so the
/// other partitions' outcomes survive.
fn guarded_load<F>(partition: String, load: F) -> PartitionReport
where
    F: FnOnce(&str) -> Result<LoadOutcome>,
{
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| load(&partition)))
        .unwrap_or_else(|_| Err(Error::Task(format!("load of partition {partition} panicked"))));
    PartitionReport { partition, outcome }
}

/// Discover, register and load partitions.
pub async fn ingest(
    layout: StoreLayout,
    registry: PartitionRegistry,
    options: IngestOptions,
) -> Result<IngestReport> {
    register_sources(&layout, &registry)?;

    let targets: Vec<String> = if options.partitions.is_empty() {
        registry.list()?.into_iter().map(|e| e.id).collect()
    } else {
        options.partitions.clone()
    };
    diagnostics::info!(
        "Ingesting {count} partitions with {jobs} jobs",
        count: targets.len(),
        jobs: options.jobs
    );

    let loader = PartitionLoader::new(layout, registry);
    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut tasks = JoinSet::new();
    let mut report = IngestReport::default();

    for partition in targets {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Task(e.to_string()))?;
        if options.cancel.is_cancelled() {
            report.not_started.push(partition);
            continue;
        }
        let loader = loader.clone();
        let force = options.force;
        tasks.spawn_blocking(move || {
            let report = guarded_load(partition, |id| loader.load(id, force));
            drop(permit);
            report
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let partition_report = joined.map_err(|e| Error::Task(e.to_string()))?;
        report.partitions.push(partition_report);
    }
    report.partitions.sort_by(|a, b| a.partition.cmp(&b.partition));

    diagnostics::info!(
        "Ingestion finished: {ok} ok, {failed} failed",
        ok: report.partitions.iter().filter(|p| p.outcome.is_ok()).count(),
        failed: report.partitions.iter().filter(|p| p.outcome.is_err()).count()
    );
    Ok(report)
}
