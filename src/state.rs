//! Persisted relay state: the id of the last fully delivered message.
//!
//! Stored as a small TOML document (`last_seen_id = 42`). Writes go to a
//! temporary file in the same directory which then replaces the old one, so
//! a crash never leaves a truncated state file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    last_seen_id: u64,
}

/// File-backed store of `last_seen_id`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `last_seen_id`. A missing file means nothing was delivered yet.
    pub fn load(&self) -> Result<u64> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting from 0");
                return Ok(0);
            }
            Err(e) => return Err(RelayError::io(&self.path, e)),
        };

        let record: StateRecord = toml::from_str(&contents).map_err(|e| RelayError::State {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(record.last_seen_id)
    }

    /// Atomically replace the stored id.
    pub fn commit(&self, last_seen_id: u64) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.state_error(e))?;

        let contents = toml::to_string(&StateRecord { last_seen_id })
            .map_err(|e| self.state_error(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.state_error(e))?;
        tmp.write_all(contents.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| self.state_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.state_error(e.error))?;

        info!(path = %self.path.display(), last_seen_id, "Committed state");
        Ok(())
    }

    fn state_error(&self, reason: impl std::fmt::Display) -> RelayError {
        RelayError::State {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.toml"));
        assert_eq!(store.load().unwrap(), 0);
    }

    #[test]
    fn test_commit_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("nested").join("state.toml"));
        store.commit(41).unwrap();
        store.commit(42).unwrap();
        assert_eq!(store.load().unwrap(), 42);

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.trim(), "last_seen_id = 42");
        // Only the state file remains, no temporary leftovers
        assert_eq!(std::fs::read_dir(tmp.path().join("nested")).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_file_is_state_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.toml");
        std::fs::write(&path, "last_seen_id = \"many\"").unwrap();
        let store = StateStore::new(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, RelayError::State { .. }));
        assert!(err.is_fatal_for_batch());
    }
}
