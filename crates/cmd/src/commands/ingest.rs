// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Result, bail};
use tripstore::{IngestOptions, LoadOutcome};

use crate::common::PondContext;

/// Load source files into partition stores and report each partition.
///
/// Fails after reporting when any partition failed to load.
pub async fn ingest_command<F>(
    ctx: &PondContext,
    partitions: Vec<String>,
    force: bool,
    jobs: Option<usize>,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let (layout, registry) = ctx.open_pond()?;
    let mut options = IngestOptions {
        partitions,
        force,
        cancel: ctx.cancel_flag().clone(),
        ..IngestOptions::default()
    };
    if let Some(jobs) = jobs {
        options.jobs = jobs;
    }

    let report = tripstore::ingest(layout, registry, options).await?;

    for partition in &report.partitions {
        let line = match &partition.outcome {
            Ok(LoadOutcome::Loaded { rows }) => format!("{}: loaded {rows} rows", partition.partition),
            Ok(LoadOutcome::Skipped { rows }) => {
                format!("{}: unchanged ({rows} rows)", partition.partition)
            }
            Err(e) => format!("{}: FAILED: {e}", partition.partition),
        };
        handler(&line);
    }
    for partition in &report.not_started {
        handler(&format!("{partition}: not started (cancelled)"));
    }

    let failed = report.partitions.iter().filter(|p| p.outcome.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} partitions failed to load", report.partitions.len());
    }
    if !report.not_started.is_empty() {
        bail!("ingestion cancelled with {} partitions not started", report.not_started.len());
    }
    handler(&format!("Loaded {} rows", report.loaded_rows()));
    Ok(())
}
