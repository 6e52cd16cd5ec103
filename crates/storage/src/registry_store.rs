// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic load/save of the persisted [`Registry`], grounded in the same
//! temp-file-then-rename pattern used for crash-safe snapshots elsewhere
//! in this stack.

use lsf_core::Registry;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Owns the on-disk location of the registry file and the atomic
/// save/load operations against it.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry, treating a missing file as a cold start rather
    /// than an error: a brief window where the target is missing is an
    /// expected side effect of the rename-based save below.
    pub fn load(&self) -> Result<Registry, StorageError> {
        if !self.path.exists() {
            return Ok(Registry::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader) {
            Ok(registry) => Ok(registry),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "corrupt registry file, starting fresh");
                Ok(Registry::new())
            }
        }
    }

    /// Serialize `registry` to a temp file and rename it over the target.
    ///
    /// On platforms where rename-over-existing is unsupported, the
    /// target is first renamed aside to `<final>.old`, then the temp file
    /// is renamed into place. That sequence accepts a window where the
    /// target briefly doesn't exist; `load` treats that the same as a
    /// cold start.
    pub fn save(&self, registry: &Registry) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("new");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, registry)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        match fs::rename(&tmp_path, &self.path) {
            Ok(()) => Ok(()),
            Err(_) if self.path.exists() => {
                // Platform without atomic rename-over-existing: shuffle
                // the old file aside first.
                let old_path = self.path.with_extension("old");
                fs::rename(&self.path, &old_path)?;
                fs::rename(&tmp_path, &self.path)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
