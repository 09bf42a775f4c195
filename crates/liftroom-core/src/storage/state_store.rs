//! Durable store for the single rest-timer state record.
//!
//! One versioned record per process, kept under a fixed storage key as
//! self-describing JSON. The write happens synchronously inside the
//! manager's transactional entry point, before any channel is notified, so
//! a crash immediately after a mutation still leaves recoverable state.

use std::path::PathBuf;

use crate::error::{Result, StorageError};
use crate::rest::RestTimerState;

use super::data_dir;

/// Fixed storage key for the persisted rest-timer record. The version
/// suffix bumps whenever the encoding changes incompatibly.
pub const STORAGE_KEY: &str = "rest_timer_state_v2";

/// File-backed key/value store holding at most one `RestTimerState`.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Open the store in the default data directory.
    pub fn open() -> Result<Self> {
        let dir = data_dir().map_err(|e| crate::error::CoreError::Custom(e.to_string()))?;
        Ok(Self::at(dir))
    }

    /// Open the store in an explicit directory. Used by tests and hosts
    /// that manage their own storage location.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(format!("{STORAGE_KEY}.json")),
        }
    }

    /// Persist the record, replacing any previous one.
    pub fn save(&self, state: &RestTimerState) -> Result<()> {
        let blob = serde_json::to_vec(state)?;
        std::fs::write(&self.path, blob).map_err(|source| StorageError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Load the record. `Ok(None)` when nothing is persisted; a decode
    /// failure is an error so the caller can discard and clear.
    pub fn load(&self) -> Result<Option<RestTimerState>> {
        let blob = match std::fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::ReadFailed {
                    path: self.path.clone(),
                    source,
                }
                .into())
            }
        };
        let state = serde_json::from_slice(&blob)
            .map_err(|e| StorageError::DecodeFailed(e.to_string()))?;
        Ok(Some(state))
    }

    /// Remove the record. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::WriteFailed {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{RestPhase, StartRest};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_state() -> RestTimerState {
        RestTimerState::begin(
            StartRest {
                workout_id: Uuid::new_v4(),
                workout_name: "Leg Day".into(),
                exercise_index: 2,
                set_index: 0,
                duration_seconds: 120,
                current_exercise: Some("Squat".into()),
                next_exercise: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path());
        let state = sample_state();

        store.save(&state).unwrap();
        let loaded = store.load().unwrap().expect("record should exist");
        assert_eq!(loaded, state);
        assert_eq!(loaded.phase, RestPhase::Running);
    }

    #[test]
    fn load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path());
        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path());
        std::fs::write(store.path(), b"not json at all").unwrap();
        assert!(store.load().is_err());
    }
}
