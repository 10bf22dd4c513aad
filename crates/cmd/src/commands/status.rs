// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use std::collections::BTreeMap;
use tripstore::merge::read_watermark;

use crate::common::PondContext;

/// List registered partitions with their load status and merge state.
pub async fn status_command<F>(ctx: &PondContext, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let (layout, registry) = ctx.open_pond()?;
    tripstore::ingest::register_sources(&layout, &registry)?;

    let merged: BTreeMap<String, u64> = read_watermark(&layout)?
        .into_iter()
        .map(|w| (w.partition, w.row_count))
        .collect();
    let entries = registry.list()?;
    if entries.is_empty() {
        handler(&format!("No partitions under {}", layout.sources_dir().display()));
        return Ok(());
    }

    for entry in entries {
        let rows = entry.row_count.map_or_else(|| "-".to_string(), |n| n.to_string());
        let merge_state = if merged.contains_key(&entry.id) { "merged" } else { "not merged" };
        let mut line = format!("{:<32} {:<8} {:>12}  {}", entry.id, entry.status.to_string(), rows, merge_state);
        if let Some(error) = &entry.error {
            line.push_str(&format!("  ({error})"));
        }
        handler(&line);
    }
    Ok(())
}
