//! JSON-file settings store.
//!
//! Settings live in a single JSON object:
//!
//! ```json
//! {
//!   "refresh-interval": 30,
//!   "monitored-containers": ["traefik", "grafana"]
//! }
//! ```
//!
//! Writes go through a temporary file and a rename. Edits made by other
//! processes are picked up by [`JsonFileSettings::check_for_changes`], which
//! tracks the file's modification time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{SettingValue, SettingsChange, SettingsStore, StoreError, CHANGE_CHANNEL_CAPACITY};

/// A settings store persisted as a JSON object on disk.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: RwLock<BTreeMap<String, SettingValue>>,
    last_modified: Mutex<Option<SystemTime>>,
    changes: broadcast::Sender<SettingsChange>,
}

impl JsonFileSettings {
    /// Open the store at `path`. A missing file is an empty store; it is
    /// created on the first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            read_values(&path)?
        } else {
            debug!("Settings file {} does not exist yet", path.display());
            BTreeMap::new()
        };
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            last_modified: Mutex::new(modified_time(&path)),
            path,
            values: RwLock::new(values),
            changes,
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file if it was modified since the last read or write.
    ///
    /// Notifies subscribers for every key whose value differs and returns
    /// those keys.
    pub fn check_for_changes(&self) -> Result<Vec<String>, StoreError> {
        let current_modified = modified_time(&self.path);

        let file_changed = {
            let last = self.last_modified.lock();
            match (*last, current_modified) {
                (_, None) => false, // File missing, keep what we have
                (None, Some(_)) => true,
                (Some(last), Some(current)) => current != last,
            }
        };
        if !file_changed {
            return Ok(Vec::new());
        }

        let fresh = read_values(&self.path)?;
        *self.last_modified.lock() = current_modified;

        let changed: Vec<String> = {
            let mut values = self.values.write();
            let keys: Vec<String> = values
                .keys()
                .chain(fresh.keys())
                .filter(|key| values.get(*key) != fresh.get(*key))
                .cloned()
                .collect();
            *values = fresh;
            keys
        };

        let mut notified: Vec<String> = Vec::new();
        for key in changed {
            if notified.contains(&key) {
                continue;
            }
            info!("Setting {} changed on disk", key);
            let _ = self.changes.send(SettingsChange::new(key.clone()));
            notified.push(key);
        }
        Ok(notified)
    }

    /// Spawn a task that calls [`check_for_changes`](Self::check_for_changes)
    /// every `period`.
    pub fn spawn_watcher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if let Err(e) = store.check_for_changes() {
                    warn!("Failed to reload settings: {}", e);
                }
            }
        })
    }

    fn write_file(&self, values: &BTreeMap<String, SettingValue>) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(values).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        *self.last_modified.lock() = modified_time(&self.path);
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<(), StoreError> {
        // Write on top of the file as it is now, not as last seen
        self.check_for_changes()?;
        {
            let mut values = self.values.write();
            if values.get(key) == Some(&value) {
                return Ok(());
            }
            let mut next = values.clone();
            next.insert(key.to_string(), value);
            self.write_file(&next)?;
            *values = next;
        }

        let _ = self.changes.send(SettingsChange::new(key));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.check_for_changes().map(|_| ())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

fn read_values(path: &Path) -> Result<BTreeMap<String, SettingValue>, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
