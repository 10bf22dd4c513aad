// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tripstore::{CancelFlag, PartitionRegistry, StoreLayout};

/// How query results are rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Boxed table with payment type labels (default)
    #[default]
    Table,
    /// One JSON array of row objects
    Json,
}

/// Everything a command needs to find the pond: the `--root` override,
/// resolved against `TRIPPOND` when absent, plus the run's cancel flag.
#[derive(Debug, Clone)]
pub struct PondContext {
    root_override: Option<PathBuf>,
    cancel: CancelFlag,
}

impl PondContext {
    pub fn new(root_override: Option<PathBuf>) -> Self {
        Self {
            root_override,
            cancel: CancelFlag::new(),
        }
    }

    pub fn layout(&self) -> Result<StoreLayout> {
        Ok(StoreLayout::from_override(self.root_override.clone())?)
    }

    /// Resolve the layout, create its directories and open the registry.
    pub fn open_pond(&self) -> Result<(StoreLayout, PartitionRegistry)> {
        let layout = self.layout()?;
        layout
            .ensure_dirs()
            .with_context(|| format!("cannot prepare pond at {}", layout.root().display()))?;
        let registry = PartitionRegistry::open(layout.registry_path())?;
        Ok((layout, registry))
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}
