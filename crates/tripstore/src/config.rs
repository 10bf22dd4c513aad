// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! On-disk layout of a trip pond.
//!
//! ```text
//! <root>/
//!   sources/            raw *.parquet files, one per partition
//!   partitions/         <partition>.duckdb, one store per partition
//!   unified.duckdb      consolidated store plus merge watermark
//!   registry.json       partition registry
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the pond root when `--root` is not given.
pub const ROOT_ENV: &str = "TRIPPOND";

const SOURCES_DIR: &str = "sources";
const PARTITIONS_DIR: &str = "partitions";
const UNIFIED_STORE: &str = "unified.duckdb";
const REGISTRY_FILE: &str = "registry.json";

/// Extension of the scratch file a load writes before it is renamed into place.
pub const LOADING_SUFFIX: &str = "loading";

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root from an optional override, falling back to `TRIPPOND`.
    pub fn from_override(override_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = override_path {
            return Ok(Self::new(path));
        }
        env::var(ROOT_ENV)
            .map(Self::new)
            .map_err(|_| Error::Config(format!("{ROOT_ENV} environment variable not set")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    pub fn partitions_dir(&self) -> PathBuf {
        self.root.join(PARTITIONS_DIR)
    }

    pub fn unified_store(&self) -> PathBuf {
        self.root.join(UNIFIED_STORE)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn partition_store(&self, partition: &str) -> PathBuf {
        self.partitions_dir().join(format!("{partition}.duckdb"))
    }

    pub fn partition_scratch(&self, partition: &str) -> PathBuf {
        self.partitions_dir()
            .join(format!("{partition}.duckdb.{LOADING_SUFFIX}"))
    }

    /// Create the directories a run writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.sources_dir())?;
        std::fs::create_dir_all(self.partitions_dir())?;
        Ok(())
    }
}
