//! File-based run-state persistence.
//!
//! Run state lives in a `.stacklift/` directory next to the request file.
//! Writes go through a temp file plus rename so a crash never leaves a
//! half-written state file, and the previous state is kept as a backup.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StackliftError, StateError};

use super::lock::{LockInfo, generate_holder_id};
use super::run_state::{RunState, STATE_VERSION};

/// Default state directory name.
const STATE_DIR: &str = ".stacklift";

/// Run-state file name.
const STATE_FILE: &str = "run-state.json";

/// Backup file name for the previous run state.
const BACKUP_FILE: &str = "run-state.backup.json";

/// Lock file name.
const LOCK_FILE: &str = "run.lock";

/// File-based run-state store.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    base_dir: PathBuf,
    state_path: PathBuf,
    backup_path: PathBuf,
    lock_path: PathBuf,
}

impl RunStateStore {
    /// Creates a store rooted in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| StackliftError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);
        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store rooted in a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let backup_path = base_dir.join(BACKUP_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            backup_path,
            lock_path,
        }
    }

    /// Path to the run-state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Loads the persisted run state, if any.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corrupted` if the file exists but cannot be read
    /// or parsed.
    pub async fn load(&self) -> Result<Option<RunState>> {
        if !self.state_path.exists() {
            debug!("No run state at {}", self.state_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to read run state: {e}"),
            }
        })?;

        let state: RunState = serde_json::from_str(&content).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse run state: {e}"),
            }
        })?;

        if state.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }
            .into());
        }

        Ok(Some(state))
    }

    /// Saves the run state atomically, keeping the previous state as backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    pub async fn save(&self, state: &RunState) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving run state to {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize run state: {e}")))?;

        if self.state_path.exists() {
            if let Err(e) = fs::copy(&self.state_path, &self.backup_path).await {
                warn!("Failed to back up previous run state: {e}");
            }
        }

        let temp_path = self.state_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.state_path).await?;

        Ok(())
    }

    /// Deletes the persisted run state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            fs::remove_file(&self.state_path).await?;
        }
        Ok(())
    }

    /// Acquires the run lock for this process.
    ///
    /// An expired lock left behind by a dead process is taken over.
    ///
    /// # Errors
    ///
    /// Returns `StateError::LockedByOther` if a live lock is held elsewhere.
    pub async fn acquire_lock(&self) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.is_expired() {
                warn!(
                    "Taking over expired lock held by {} since {}",
                    existing.holder, existing.acquired_at
                );
            } else {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
        }

        let lock = LockInfo::new(&generate_holder_id());
        self.write_lock_file(&lock).await?;
        debug!("Acquired run lock {}", lock.lock_id);
        Ok(lock)
    }

    /// Extends a held lock's expiry and persists it.
    ///
    /// A long run calls this periodically so its lock never expires while
    /// the executor is still working; an expired lock would let a second
    /// process take it over mid-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be written.
    pub async fn refresh_lock(&self, lock: &mut LockInfo) -> Result<()> {
        lock.refresh();
        self.write_lock_file(lock).await?;
        debug!("Refreshed run lock {}", lock.lock_id);
        Ok(())
    }

    /// Releases the run lock if this process holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub async fn release_lock(&self, lock: &LockInfo) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock.lock_id {
                fs::remove_file(&self.lock_path).await.map_err(|e| {
                    StateError::LockFailed {
                        message: format!("Failed to remove lock file: {e}"),
                    }
                })?;
                debug!("Released run lock {}", lock.lock_id);
            }
        }
        Ok(())
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await?;
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            }
        })?;

        let lock: LockInfo = serde_json::from_str(&content).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            }
        })?;

        Ok(Some(lock))
    }

    async fn write_lock_file(&self, lock: &LockInfo) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(lock)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let mut file = fs::File::create(&self.lock_path).await.map_err(|e| {
            StateError::LockFailed {
                message: format!("Failed to create lock file: {e}"),
            }
        })?;
        file.write_all(content.as_bytes()).await.map_err(|e| {
            StateError::LockFailed {
                message: format!("Failed to write lock file: {e}"),
            }
        })?;
        file.sync_all().await.map_err(|e| {
            StateError::LockFailed {
                message: format!("Failed to sync lock file: {e}"),
            }
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::run_state::RunStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_state_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = RunStateStore::with_base_dir(dir.path().join(STATE_DIR));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = RunStateStore::with_base_dir(dir.path().join(STATE_DIR));

        let mut state = RunState::new("hash-1");
        state.finish(RunStatus::Succeeded);
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.request_hash, "hash-1");
        assert!(loaded.is_successful());
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_state() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join(STATE_DIR);
        let store = RunStateStore::with_base_dir(&base);

        let first = RunState::new("hash-1");
        store.save(&first).await.unwrap();
        let second = RunState::new("hash-2");
        store.save(&second).await.unwrap();

        let backup = std::fs::read_to_string(base.join(BACKUP_FILE)).unwrap();
        let backup_state: RunState = serde_json::from_str(&backup).unwrap();
        assert_eq!(backup_state.run_id, first.run_id);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join(STATE_DIR);
        let store = RunStateStore::with_base_dir(&base);

        let mut state = RunState::new("hash-1");
        state.version = String::from("0");
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err,
            StackliftError::State(StateError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupted_state_is_reported() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join(STATE_FILE), "not json").unwrap();

        let store = RunStateStore::with_base_dir(&base);
        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err,
            StackliftError::State(StateError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_refreshed_lock_stays_held() {
        let dir = TempDir::new().unwrap();
        let store = RunStateStore::with_base_dir(dir.path().join(STATE_DIR));

        let mut lock = store.acquire_lock().await.unwrap();
        // Simulate a long run whose lock is about to lapse.
        lock.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        store.refresh_lock(&mut lock).await.unwrap();
        assert!(!lock.is_expired());

        // A competing process still sees a live lock, not a takeover target.
        let err = store.acquire_lock().await.unwrap_err();
        assert!(matches!(
            err,
            StackliftError::State(StateError::LockedByOther { .. })
        ));
        store.release_lock(&lock).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_excludes_second_acquirer() {
        let dir = TempDir::new().unwrap();
        let store = RunStateStore::with_base_dir(dir.path().join(STATE_DIR));

        let lock = store.acquire_lock().await.unwrap();
        let err = store.acquire_lock().await.unwrap_err();
        assert!(matches!(
            err,
            StackliftError::State(StateError::LockedByOther { .. })
        ));

        store.release_lock(&lock).await.unwrap();
        let relock = store.acquire_lock().await.unwrap();
        store.release_lock(&relock).await.unwrap();
    }
}
