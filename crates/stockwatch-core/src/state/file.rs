// # File State Store
//
// File-based implementation of KnownStateStore with crash recovery.
//
// ## Purpose
//
// Persists the known-vehicle baseline across restarts so a restarted
// watcher does not re-announce inventory it has already reported.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "E20250201": ["VH000123", "VH000456"],
//   "E20250202": []
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::model::KnownState;
use crate::traits::state_store::KnownStateStore;

/// File-based known-state store with crash recovery
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to temporary file, then renamed
/// - **Backup**: Last known good state kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use stockwatch_core::state::FileStateStore;
/// use stockwatch_core::traits::KnownStateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/stockwatch/known_vehicles.json").await?;
///
///     let mut state = store.load().await?;
///     state.record("E01", &vec!["VH000123".to_string()]);
///     store.save(&state).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a file state store
    ///
    /// Creates parent directories if needed. Nothing is read until
    /// [`KnownStateStore::load`] is called.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<KnownState, Error> {
        match Self::load_state(path).await {
            Ok(state) => Ok(state),
            Err(LoadError::Read(e)) => Err(e),
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!(
                    "State file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(KnownState::new());
                }

                match Self::load_state(&backup_path).await {
                    Ok(state) => {
                        tracing::info!(
                            "Recovered state from backup: {} target(s)",
                            state.targets().count()
                        );

                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(state)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unusable: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(KnownState::new())
                    }
                }
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<KnownState, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(KnownState::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Read(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })
    }

    /// Write state to file atomically
    async fn write_state(&self, state: &KnownState) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous file as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

/// Load failure split by recoverability
enum LoadError {
    Read(Error),
    Corrupt(Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Read(e) | LoadError::Corrupt(e) => write!(f, "{}", e),
        }
    }
}

#[async_trait]
impl KnownStateStore for FileStateStore {
    async fn load(&self) -> Result<KnownState, Error> {
        let state = Self::load_state_with_recovery(&self.path).await?;
        tracing::debug!("Loaded known state: {} target(s)", state.targets().count());
        Ok(state)
    }

    async fn save(&self, state: &KnownState) -> Result<(), Error> {
        self.write_state(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_vehicles.json");

        let store = FileStateStore::new(&path).await.unwrap();

        // Initially empty
        let state = store.load().await.unwrap();
        assert!(state.is_empty());

        let mut state = KnownState::new();
        state.record("E01", &ids(&["A", "B"]));
        store.save(&state).await.unwrap();
        assert!(path.exists());

        // Load new instance and verify persistence
        let store2 = FileStateStore::new(&path).await.unwrap();
        let loaded = store2.load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_file_store_reads_plain_object_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_vehicles.json");
        fs::write(&path, br#"{"E01": ["A", "B"], "E02": []}"#)
            .await
            .unwrap();

        let store = FileStateStore::new(&path).await.unwrap();
        let state = store.load().await.unwrap();

        assert_eq!(state.ids("E01"), &ids(&["A", "B"])[..]);
        assert!(state.contains_target("E02"));
        assert_eq!(state.count("E02"), 0);
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_vehicles.json");

        let store = FileStateStore::new(&path).await.unwrap();

        let mut state = KnownState::new();
        state.record("E01", &ids(&["A"]));
        store.save(&state).await.unwrap();

        // Second write creates the backup of the first
        state.record("E01", &ids(&["B"]));
        store.save(&state).await.unwrap();

        let backup_path = FileStateStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = store.load().await.unwrap();
        assert_eq!(
            recovered.ids("E01"),
            &ids(&["A"])[..],
            "Backup should contain previous state, not latest"
        );
    }

    #[tokio::test]
    async fn test_file_store_corrupt_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_vehicles.json");
        fs::write(&path, b"{not json").await.unwrap();

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("known.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.save(&KnownState::new()).await.unwrap();
        assert!(path.exists());
    }
}
