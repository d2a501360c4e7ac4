//! On-disk outputs: the append-only metadata log and the asset directory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::model::{record_id, ResultRecord};

/// Errors from the metadata log or the asset store.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("metadata log I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Metadata Log
// ============================================================================

/// Newline-delimited JSON log of result records.
///
/// Each line is one record exactly as received, with no wrapper fields. The
/// file is only ever appended to, so it is resumable by replay and safe to
/// tail concurrently.
#[derive(Debug)]
pub struct MetadataLog {
    path: PathBuf,
    file: File,
}

impl MetadataLog {
    /// Opens (or creates) the log in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a compact JSON line and flushes it.
    pub fn append(&mut self, record: &ResultRecord) -> Result<(), LogError> {
        let io_err = |e: std::io::Error| LogError::Io {
            path: self.path.display().to_string(),
            source: e,
        };
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}").map_err(io_err)?;
        self.file.flush().map_err(io_err)
    }

    /// Replays the log and returns every record ID found.
    ///
    /// Unparseable lines (a crash-truncated tail, for instance) are skipped
    /// with a warning rather than failing the replay; the union of these IDs
    /// with the checkpoint's seen-set restores the dedup invariant after a
    /// crash left the two inconsistent.
    pub fn replay_ids(&self) -> Result<Vec<u64>, LogError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| LogError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let mut ids = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResultRecord>(line) {
                Ok(record) => {
                    if let Some(id) = record_id(&record) {
                        ids.push(id);
                    }
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping unparseable metadata log line"
                    );
                }
            }
        }
        Ok(ids)
    }
}

// ============================================================================
// Asset Store
// ============================================================================

/// Directory of downloaded assets, one file per result named `<id><ext>`.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// Creates the asset directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Destination path for a result's asset.
    pub fn asset_path(&self, id: u64, url: &str) -> PathBuf {
        self.dir.join(format!("{id}{}", infer_extension(url)))
    }

    /// Writes the downloaded bytes and returns the destination path.
    pub fn write(&self, id: u64, url: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let dest = self.asset_path(id, url);
        std::fs::write(&dest, bytes)?;
        Ok(dest)
    }
}

/// File extension from the URL's path suffix, query string stripped;
/// `.jpg` when the path carries none.
fn infer_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => format!(".{ext}"),
        _ => ".jpg".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64) -> ResultRecord {
        json!({"id": id, "tags": "beauty"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut log = MetadataLog::open(&path).unwrap();
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();
        assert_eq!(log.replay_ids().unwrap(), vec![1, 2]);

        // Reopening appends rather than truncating.
        let mut log = MetadataLog::open(&path).unwrap();
        log.append(&record(3)).unwrap();
        assert_eq!(log.replay_ids().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_lines_hold_records_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut log = MetadataLog::open(&path).unwrap();
        log.append(&record(7)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line, json!({"id": 7, "tags": "beauty"}));
    }

    #[test]
    fn test_replay_skips_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut log = MetadataLog::open(&path).unwrap();
        log.append(&record(1)).unwrap();
        // Simulate a crash mid-append.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"id\": 2, \"tag")
            .unwrap();

        assert_eq!(log.replay_ids().unwrap(), vec![1]);
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("https://cdn/img_1280.png"), ".png");
        assert_eq!(infer_extension("https://cdn/img.jpg?token=abc"), ".jpg");
        assert_eq!(infer_extension("https://cdn/img.jpeg#frag"), ".jpeg");
        assert_eq!(infer_extension("https://cdn/noext"), ".jpg");
        assert_eq!(infer_extension("https://cdn.example.com/noext"), ".jpg");
    }

    #[test]
    fn test_asset_store_naming() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::create(dir.path().join("images")).unwrap();

        let dest = store
            .write(42, "https://cdn/photo.png?sig=x", b"bytes")
            .unwrap();
        assert_eq!(dest.file_name().unwrap(), "42.png");
        assert_eq!(std::fs::read(dest).unwrap(), b"bytes");
    }
}
