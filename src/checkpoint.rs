//! Durable harvest progress.
//!
//! The checkpoint is the sole source of resumability: the set of processed
//! query descriptors, the set of result IDs already recorded, and a running
//! collected count. Every save rewrites the complete state through a
//! temporary file plus atomic rename, so a crash mid-write can never corrupt
//! the previous checkpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Complete harvest progress. Serializes as
/// `{"processed": [...], "seen_ids": [...], "stats": {"collected": n}}`.
///
/// Ordered sets keep the serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Canonical keys of descriptors fully processed
    #[serde(default)]
    pub processed: BTreeSet<String>,

    /// Provider IDs already appended to the metadata log
    #[serde(default)]
    pub seen_ids: BTreeSet<u64>,

    #[serde(default)]
    pub stats: HarvestTotals,
}

/// Cumulative statistics carried across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestTotals {
    /// Unique records collected over the checkpoint's lifetime
    #[serde(default)]
    pub collected: u64,
}

/// Errors from checkpoint persistence. Always fatal to a harvest run: the
/// loop cannot safely continue without durable progress tracking.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Reading or writing the checkpoint file failed
    #[error("checkpoint I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint file exists but is not valid JSON
    #[error("checkpoint '{path}' is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The state could not be serialized for writing
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(serde_json::Error),
}

/// Loads and atomically saves [`CheckpointState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last persisted state, or the empty initial state when no
    /// checkpoint file exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] on any read failure other than
    /// file-not-found, or when the file cannot be parsed.
    pub fn load(&self) -> Result<CheckpointState, CheckpointError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CheckpointState::default());
            }
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    /// Writes the full state to `<path>.tmp`, then atomically renames it over
    /// the previous checkpoint. No partial updates; every save rewrites the
    /// complete state.
    pub fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let io_err = |e: std::io::Error| CheckpointError::Io {
            path: self.path.display().to_string(),
            source: e,
        };

        let json = serde_json::to_vec_pretty(state).map_err(CheckpointError::Serialize)?;

        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}
