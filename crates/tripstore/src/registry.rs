// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Partition registry - persisted record of every known partition.
//!
//! The registry is the single source of truth for which partitions are
//! eligible for merge. It lives in one JSON file that is rewritten through a
//! temporary file and an atomic rename on every mutation, so a crash leaves
//! either the old or the new contents.
//!
//! Load claims serialize work per partition: a loader must hold the
//! [`LoadClaim`] for a partition before it may change that partition's
//! status, and only one claim per partition exists at a time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    Pending,
    Loaded,
    Failed,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStatus::Pending => "PENDING",
            LoadStatus::Loaded => "LOADED",
            LoadStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Registry record for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub id: String,
    pub source: PathBuf,
    pub source_sha256: Option<String>,
    pub status: LoadStatus,
    pub row_count: Option<u64>,
    pub store: PathBuf,
    pub error: Option<String>,
    pub updated_at: i64, // Microseconds since epoch
}

impl PartitionEntry {
    fn new(id: &str, source: &Path, store: &Path) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_path_buf(),
            source_sha256: None,
            status: LoadStatus::Pending,
            row_count: None,
            store: store.to_path_buf(),
            error: None,
            updated_at: now_micros(),
        }
    }
}

/// What a status transition records alongside the new status.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Loaded { row_count: u64, source_sha256: String },
    Failed { error: String },
}

impl Transition {
    fn status(&self) -> LoadStatus {
        match self {
            Transition::Loaded { .. } => LoadStatus::Loaded,
            Transition::Failed { .. } => LoadStatus::Failed,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    partitions: BTreeMap<String, PartitionEntry>,
}

#[derive(Debug, Default)]
struct RegistryState {
    file: RegistryFile,
    claimed: HashSet<String>,
}

/// Shared, persisted partition registry
#[derive(Debug, Clone)]
pub struct PartitionRegistry {
    path: PathBuf,
    state: Arc<Mutex<RegistryState>>,
}

impl PartitionRegistry {
    /// Open the registry at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };
        diagnostics::debug!(
            "Opened registry {path} with {count} partitions",
            path: path.display().to_string(),
            count: file.partitions.len()
        );
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(RegistryState {
                file,
                claimed: HashSet::new(),
            })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Registry("registry lock poisoned".into()))
    }

    /// Add a newly discovered partition as PENDING. Existing entries are
    /// returned unchanged.
    pub fn register(&self, id: &str, source: &Path, store: &Path) -> Result<PartitionEntry> {
        let mut state = self.lock()?;
        if let Some(existing) = state.file.partitions.get(id) {
            return Ok(existing.clone());
        }
        let entry = PartitionEntry::new(id, source, store);
        state.file.partitions.insert(id.to_string(), entry.clone());
        self.persist(&state.file)?;
        diagnostics::info!("Registered partition {partition}", partition: id);
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<Option<PartitionEntry>> {
        Ok(self.lock()?.file.partitions.get(id).cloned())
    }

    pub fn status(&self, id: &str) -> Result<Option<LoadStatus>> {
        Ok(self.lock()?.file.partitions.get(id).map(|e| e.status))
    }

    /// All partitions, ordered by id.
    pub fn list(&self) -> Result<Vec<PartitionEntry>> {
        Ok(self.lock()?.file.partitions.values().cloned().collect())
    }

    /// Partitions with the given status, ordered by id.
    pub fn list_by_status(&self, status: LoadStatus) -> Result<Vec<PartitionEntry>> {
        Ok(self
            .lock()?
            .file
            .partitions
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }

    /// Claim exclusive load rights for a partition.
    pub fn claim(&self, id: &str) -> Result<LoadClaim> {
        let mut state = self.lock()?;
        if !state.file.partitions.contains_key(id) {
            return Err(Error::UnknownPartition(id.to_string()));
        }
        if !state.claimed.insert(id.to_string()) {
            return Err(Error::PartitionBusy(id.to_string()));
        }
        Ok(LoadClaim {
            registry: self.clone(),
            id: id.to_string(),
        })
    }

    fn release(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.claimed.remove(id);
        }
    }

    fn persist(&self, file: &RegistryFile) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, file)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Exclusive right to change one partition's status; released on drop.
#[derive(Debug)]
pub struct LoadClaim {
    registry: PartitionRegistry,
    id: String,
}

impl LoadClaim {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the claimed partition's status.
    pub fn set_status(&self, transition: Transition) -> Result<PartitionEntry> {
        let mut state = self.registry.lock()?;
        let entry = state
            .file
            .partitions
            .get_mut(&self.id)
            .ok_or_else(|| Error::UnknownPartition(self.id.clone()))?;

        entry.status = transition.status();
        entry.updated_at = now_micros();
        match transition {
            Transition::Loaded {
                row_count,
                source_sha256,
            } => {
                entry.row_count = Some(row_count);
                entry.source_sha256 = Some(source_sha256);
                entry.error = None;
            }
            Transition::Failed { error } => {
                entry.row_count = None;
                entry.error = Some(error);
            }
        }
        let updated = entry.clone();
        self.registry.persist(&state.file)?;
        Ok(updated)
    }
}

impl Drop for LoadClaim {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}
