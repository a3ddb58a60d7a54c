use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Durable schedule-state failure.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt schedule state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The scheduler's only durable value: the last slot whose cycle ran to
/// completion.
///
/// A slot is recorded here only after its dispatch cycle returns, so a crash
/// or shutdown mid-cycle leaves the slot unmarked and it re-fires on the
/// next start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub last_slot: Option<DateTime<Utc>>,
}

/// Persistence boundary for [`ScheduleState`].
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn load(&self) -> Result<ScheduleState, StateError>;
    async fn save(&self, state: &ScheduleState) -> Result<(), StateError>;
}

/// JSON-file-backed [`StateStore`].
///
/// Saves write a sibling temp file and rename it into place, so an
/// interrupted save leaves the previous state intact. A missing file loads
/// as the empty state; an unreadable file is an error, because guessing
/// here could fire a slot twice.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<ScheduleState, StateError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScheduleState::default()),
            Err(e) => Err(StateError::Io(e)),
        }
    }

    async fn save(&self, state: &ScheduleState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory [`StateStore`] for development and testing. Not durable.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<ScheduleState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ScheduleState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<ScheduleState, StateError> {
        Ok(*self.state.lock().await)
    }

    async fn save(&self, state: &ScheduleState) -> Result<(), StateError> {
        *self.state.lock().await = *state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn missing_file_loads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("schedule.json"));

        assert_eq!(store.load().await.unwrap(), ScheduleState::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("schedule.json"));
        let state = ScheduleState {
            last_slot: Some(Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap()),
        };

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = FileStateStore::new(path);

        assert!(matches!(store.load().await, Err(StateError::Corrupt(_))));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        let store = FileStateStore::new(&path);

        store.save(&ScheduleState::default()).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
