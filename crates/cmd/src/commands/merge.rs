// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Result, anyhow, bail};
use tripstore::MergeConsolidator;

use crate::common::PondContext;

/// Fold every LOADED partition into the unified store.
pub async fn merge_command<F>(ctx: &PondContext, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let (layout, registry) = ctx.open_pond()?;
    let cancel = ctx.cancel_flag().clone();
    let consolidator = MergeConsolidator::new(layout, registry);

    let report = tokio::task::spawn_blocking(move || consolidator.merge(&cancel))
        .await
        .map_err(|e| anyhow!("merge task failed: {e}"))??;

    for partition in &report.pruned {
        handler(&format!("{partition}: pruned"));
    }
    for (partition, rows) in &report.merged {
        handler(&format!("{partition}: merged {rows} rows"));
    }
    for partition in &report.skipped {
        handler(&format!("{partition}: up to date"));
    }
    for err in &report.unavailable {
        handler(&format!("{err}"));
    }
    for partition in &report.not_started {
        handler(&format!("{partition}: not started (cancelled)"));
    }

    if report.has_failures() {
        bail!("{} partitions were unavailable", report.unavailable.len());
    }
    if !report.not_started.is_empty() {
        bail!("merge cancelled with {} partitions not started", report.not_started.len());
    }
    Ok(())
}
