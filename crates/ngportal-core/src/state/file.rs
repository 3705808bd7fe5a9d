// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps the last accepted IP, the last update time and the last status line
// across restarts, so a restart does not re-send an update the provider
// already has.
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to a temporary file, is synced, then
//   renamed over the target
// - Corruption detection: JSON validation on load
// - Automatic backup: keeps .backup of last known good state
// - Recovery: falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "record": {
//     "domain": "myhouse",
//     "last_ip": "203.0.113.42",
//     "last_updated": "2025-11-01T18:05:00Z",
//     "last_status": "Success",
//     "last_attempt": { ... }
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StateStoreConfig;
use crate::traits::state_store::{StateRecord, StateStore, StateStoreFactory};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ngportal_core::state::FileStateStore;
/// use ngportal_core::traits::{StateRecord, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ngportal/ddns-state.json").await?;
///
///     let record = StateRecord {
///         domain: Some("myhouse".to_string()),
///         last_ip: Some("203.0.113.42".parse()?),
///         ..Default::default()
///     };
///     store.save(&record).await?;
///
///     assert_eq!(store.load().await?.last_ip_for("myhouse"), record.last_ip);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

/// Internal state for file-based store
#[derive(Debug)]
struct FileState {
    record: StateRecord,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    record: StateRecord,
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing state file
    /// 3. If it is corrupted, try the backup
    /// 4. If both fail, start with empty state
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        let record = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                record,
                dirty: false,
            })),
        })
    }

    /// Load state from file with automatic recovery
    async fn load_state_with_recovery(path: &Path) -> Result<StateRecord, Error> {
        match Self::load_state(path).await {
            Ok(record) => Ok(record),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "State file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = backup_path(path);
                if !fs::try_exists(&backup_path).await.unwrap_or(false) {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(StateRecord::default());
                }

                match Self::load_state(&backup_path).await {
                    Ok(record) => {
                        tracing::info!("Recovered state from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(record)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unusable: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(StateRecord::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load state from file
    ///
    /// Parse failures come back as `Error::Json` so the caller can tell
    /// corruption from I/O trouble.
    async fn load_state(path: &Path) -> Result<StateRecord, Error> {
        if !fs::try_exists(path).await? {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(StateRecord::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.record)
    }

    /// Write the cached record to disk atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            record: state_guard.record.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::persistence(format!("Failed to serialize state: {}", e)))?;

        write_atomic(&self.path, json.as_bytes()).await?;
        state_guard.dirty = false;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }
}

/// Replace `path` with `contents` without ever exposing a partial file
///
/// The previous file, if any, is kept as `<name>.backup`.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    ensure_parent_dir(path).await?;

    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(contents).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to write to temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::persistence(format!(
                "Failed to sync temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    if fs::try_exists(path).await.unwrap_or(false)
        && let Err(e) = fs::copy(path, backup_path(path)).await
    {
        tracing::warn!("Failed to create backup of {}: {}", path.display(), e);
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::persistence(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })
}

async fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Get path to temporary file for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    temp.set_extension("tmp");
    temp
}

/// Get path to backup file
fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.to_path_buf();
    backup.set_extension("backup");
    backup
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<StateRecord, Error> {
        Ok(self.state.read().await.record.clone())
    }

    async fn save(&self, record: &StateRecord) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            state_guard.record = record.clone();
            state_guard.dirty = true;
        }

        // Immediate write for durability
        self.write_state().await
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}

/// Factory for file-based state stores
pub struct FileStateStoreFactory;

#[async_trait]
impl StateStoreFactory for FileStateStoreFactory {
    async fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::File { path } => {
                if path.trim().is_empty() {
                    return Err(Error::config("State file path cannot be empty"));
                }
                Ok(Box::new(FileStateStore::new(path).await?))
            }
            _ => Err(Error::config("Invalid config for file state store")),
        }
    }
}
