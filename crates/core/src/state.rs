//! Persisted last-successful-check timestamp.
//!
//! A single key-value pair that survives restarts and lets a non-forced boot
//! skip the probe/query cycle inside the cool-down window.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Name of the persisted key.
pub const LAST_CHECK_KEY: &str = "last_successful_check";

const STATE_FILE: &str = "devpack-state.json";

/// Durable storage for the last successful check.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// The last successful check, absent on first run.
    async fn last_check(&self) -> Result<Option<DateTime<Utc>>>;

    /// Persist a successful check.
    async fn record_check(&self, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    last_successful_check: Option<i64>,
}

/// JSON file store under a state directory.
#[derive(Debug, Clone)]
pub struct FileCheckStore {
    state_dir: PathBuf,
}

impl FileCheckStore {
    /// Create a store writing into `state_dir`.
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The default state directory, `~/.devpack/state`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no home directory is known.
    pub fn default_state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::configuration("Could not determine home directory"))?;
        Ok(home.join(".devpack").join("state"))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    async fn read(&self, path: &Path) -> Result<StateFile> {
        if !path.exists() {
            return Ok(StateFile::default());
        }
        let json = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "read_to_string"))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::serialization(format!("Failed to deserialize state: {e}")))
    }
}

#[async_trait]
impl CheckStore for FileCheckStore {
    async fn last_check(&self) -> Result<Option<DateTime<Utc>>> {
        let state = self.read(&self.state_file()).await?;
        Ok(state
            .last_successful_check
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    async fn record_check(&self, at: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| Error::io(e, Some(self.state_dir.clone()), "create_dir_all"))?;

        let path = self.state_file();
        let mut state = self.read(&path).await.unwrap_or_default();
        state.last_successful_check = Some(at.timestamp_millis());

        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| Error::serialization(format!("Failed to serialize state: {e}")))?;
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "create"))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "write_all"))?;
        file.sync_all()
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "sync_all"))?;
        drop(file);

        // Readers see either the old file or the new one, never a partial write.
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::io(e, Some(path.clone()), "rename"))?;

        debug!(path = %path.display(), at = %at.to_rfc3339(), "Recorded successful check");
        Ok(())
    }
}

/// In-memory store, for hosts without durable storage and for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckStore {
    last: Mutex<Option<i64>>,
}

impl MemoryCheckStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a check at `at`.
    #[must_use]
    pub fn with_last_check(at: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new(Some(at.timestamp_millis())),
        }
    }
}

#[async_trait]
impl CheckStore for MemoryCheckStore {
    async fn last_check(&self) -> Result<Option<DateTime<Utc>>> {
        let last = *self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(last.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    async fn record_check(&self, at: DateTime<Utc>) -> Result<()> {
        *self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(at.timestamp_millis());
        Ok(())
    }
}

/// Whether `last` is younger than `cooldown` at `now`.
///
/// A timestamp in the future (clock moved backwards) does not count.
#[must_use]
pub fn within_cooldown(last: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    let Ok(age) = (now - last).to_std() else {
        return false;
    };
    age < cooldown
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_within_cooldown() {
        let now = Utc::now();
        assert!(within_cooldown(now - chrono::Duration::minutes(10), now, HOUR));
        assert!(!within_cooldown(now - chrono::Duration::minutes(61), now, HOUR));
        assert!(!within_cooldown(now + chrono::Duration::minutes(5), now, HOUR));
        assert!(!within_cooldown(now, now, Duration::ZERO));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckStore::new(dir.path().join("nested"));

        assert_eq!(store.last_check().await.unwrap(), None);

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        store.record_check(at).await.unwrap();
        assert_eq!(store.last_check().await.unwrap(), Some(at));

        let raw = std::fs::read_to_string(store.state_file()).unwrap();
        assert!(raw.contains(LAST_CHECK_KEY));
        assert!(raw.contains("1700000000123"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckStore::new(dir.path());
        std::fs::write(store.state_file(), "not json").unwrap();

        assert!(matches!(
            store.last_check().await,
            Err(Error::Serialization { .. })
        ));
        // A corrupt file is replaced on the next successful check.
        store.record_check(Utc::now()).await.unwrap();
        assert!(store.last_check().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_check_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckStore::new(dir.path());
        let first = Utc.timestamp_millis_opt(1_000).unwrap();
        let second = Utc.timestamp_millis_opt(2_000).unwrap();

        store.record_check(first).await.unwrap();
        store.record_check(second).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec![STATE_FILE.to_string()]);
        assert_eq!(store.last_check().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCheckStore::new();
        assert_eq!(store.last_check().await.unwrap(), None);
        let at = Utc.timestamp_millis_opt(42).unwrap();
        store.record_check(at).await.unwrap();
        assert_eq!(store.last_check().await.unwrap(), Some(at));
    }
}
