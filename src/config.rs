//! Monitor configuration and its manager.
//!
//! [`ConfigManager`] owns the current [`MonitorConfig`]. Readers get an
//! immutable `Arc` snapshot; writers build a new config, persist it to the
//! settings store and swap it in, so a reader never sees a half-applied edit.
//! Every effective change is announced as a [`ConfigEvent`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{
    MemorySettings, SettingsStore, StoreError, MONITORED_CONTAINERS_KEY, REFRESH_INTERVAL_KEY,
};

/// Shortest allowed poll interval in seconds.
pub const MIN_INTERVAL_SECS: u32 = 5;

/// Longest allowed poll interval in seconds.
pub const MAX_INTERVAL_SECS: u32 = 300;

/// Interval used when the store has none.
pub const DEFAULT_INTERVAL_SECS: u32 = 30;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What the engine monitors and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    interval_seconds: u32,
    watch_list: Vec<String>,
}

impl MonitorConfig {
    /// Build a config, clamping the interval and dropping blank or repeated
    /// names.
    pub fn new<I, S>(interval_seconds: u32, watch_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self {
            interval_seconds: interval_seconds.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS),
            watch_list: Vec::new(),
        };
        config.merge(watch_list);
        config
    }

    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_seconds))
    }

    /// Watched names in insertion order.
    pub fn watch_list(&self) -> &[String] {
        &self.watch_list
    }

    pub fn contains(&self, name: &str) -> bool {
        self.watch_list.iter().any(|n| n == name)
    }

    /// Append names not yet present, in first-seen order. Returns the names
    /// that were appended.
    fn merge<I, S>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || self.contains(name) {
                continue;
            }
            self.watch_list.push(name.to_string());
            added.push(name.to_string());
        }
        added
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            watch_list: Vec::new(),
        }
    }
}

/// Clamp a requested interval into the allowed range.
///
/// Only non-positive values are rejected; anything else out of range is
/// clamped.
pub fn clamp_interval(seconds: i64) -> Result<u32, ConfigError> {
    if seconds <= 0 {
        return Err(ConfigError::InvalidConfig(format!(
            "interval must be a positive number of seconds, got {seconds}"
        )));
    }
    let clamped = seconds.clamp(i64::from(MIN_INTERVAL_SECS), i64::from(MAX_INTERVAL_SECS));
    Ok(clamped as u32)
}

/// A change to the effective configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The poll interval changed to the given number of seconds.
    IntervalChanged(u32),
    /// Names were added to or removed from the watch list.
    WatchListChanged,
}

/// Rejected configuration edits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid container name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owner of the live [`MonitorConfig`].
#[derive(Debug)]
pub struct ConfigManager {
    store: Arc<dyn SettingsStore>,
    current: RwLock<Arc<MonitorConfig>>,
    /// Serializes writers, including reloads from the store.
    write_lock: Mutex<()>,
    events: broadcast::Sender<ConfigEvent>,
}

impl ConfigManager {
    /// Load the configuration from `store`.
    ///
    /// Stored values are normalized (interval clamped, names trimmed and
    /// deduplicated) but not written back.
    pub fn load(store: Arc<dyn SettingsStore>) -> Result<Self, ConfigError> {
        let config = read_config(store.as_ref())?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        debug!(
            "Loaded config: interval {}s, {} watched containers",
            config.interval_seconds,
            config.watch_list.len()
        );
        Ok(Self {
            store,
            current: RwLock::new(Arc::new(config)),
            write_lock: Mutex::new(()),
            events,
        })
    }

    /// A manager backed by a fresh [`MemorySettings`] store.
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: Arc::new(MemorySettings::new()),
            current: RwLock::new(Arc::new(MonitorConfig::default())),
            write_lock: Mutex::new(()),
            events,
        }
    }

    /// Immutable snapshot of the current configuration.
    pub fn get_config(&self) -> Arc<MonitorConfig> {
        self.current.read().clone()
    }

    /// The settings store this manager persists to.
    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// Receive [`ConfigEvent`]s for every effective change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Set the poll interval, clamped to
    /// [`MIN_INTERVAL_SECS`]..=[`MAX_INTERVAL_SECS`].
    ///
    /// Returns `Ok(false)` when the clamped value equals the current one.
    pub fn set_interval(&self, seconds: i64) -> Result<bool, ConfigError> {
        let interval = clamp_interval(seconds)?;

        let _guard = self.write_lock.lock();
        self.apply_store_locked()?;
        let current = self.get_config();
        if current.interval_seconds == interval {
            return Ok(false);
        }

        self.store.set_int(REFRESH_INTERVAL_KEY, i64::from(interval))?;
        self.swap(MonitorConfig {
            interval_seconds: interval,
            watch_list: current.watch_list.clone(),
        });
        info!("Refresh interval set to {}s", interval);
        self.emit(ConfigEvent::IntervalChanged(interval));
        Ok(true)
    }

    /// Add a container to the end of the watch list.
    ///
    /// The name is trimmed. Returns `Ok(false)` if it is already watched.
    pub fn add_container(&self, name: &str) -> Result<bool, ConfigError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        Ok(!self.import_names([trimmed])?.is_empty())
    }

    /// Remove a container from the watch list.
    ///
    /// Returns `Ok(false)` if it was not watched.
    pub fn remove_container(&self, name: &str) -> Result<bool, ConfigError> {
        let _guard = self.write_lock.lock();
        self.apply_store_locked()?;
        let current = self.get_config();
        if !current.contains(name) {
            return Ok(false);
        }

        let watch_list: Vec<String> = current
            .watch_list
            .iter()
            .filter(|n| n.as_str() != name)
            .cloned()
            .collect();
        self.store
            .set_strv(MONITORED_CONTAINERS_KEY, watch_list.clone())?;
        self.swap(MonitorConfig {
            interval_seconds: current.interval_seconds,
            watch_list,
        });
        info!("Stopped watching {}", name);
        self.emit(ConfigEvent::WatchListChanged);
        Ok(true)
    }

    /// Merge `names` into the watch list: existing order is kept and new
    /// names are appended in the order first seen. Blank names are skipped.
    ///
    /// Returns the names that were added.
    ///
    /// # Example
    ///
    /// ```
    /// use dockwatch::ConfigManager;
    ///
    /// let manager = ConfigManager::in_memory();
    /// manager.import_names(["a", "c"]).unwrap();
    /// let added = manager.import_names(["b", "a", "d"]).unwrap();
    ///
    /// assert_eq!(added, vec!["b", "d"]);
    /// assert_eq!(manager.get_config().watch_list(), ["a", "c", "b", "d"]);
    /// ```
    pub fn import_names<I, S>(&self, names: I) -> Result<Vec<String>, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.write_lock.lock();
        self.apply_store_locked()?;
        let current = self.get_config();
        let mut next = MonitorConfig::clone(&current);
        let added = next.merge(names);
        if added.is_empty() {
            return Ok(added);
        }

        self.store
            .set_strv(MONITORED_CONTAINERS_KEY, next.watch_list.clone())?;
        self.swap(next);
        info!("Now watching {}", added.join(", "));
        self.emit(ConfigEvent::WatchListChanged);
        Ok(added)
    }

    /// Re-read both keys from the store and apply any difference, emitting
    /// the same events a direct edit would.
    pub fn reload_from_store(&self) -> Result<Vec<ConfigEvent>, ConfigError> {
        let _guard = self.write_lock.lock();
        self.apply_store_locked()
    }

    /// Bring the live config in line with the store. Callers hold
    /// `write_lock`.
    fn apply_store_locked(&self) -> Result<Vec<ConfigEvent>, ConfigError> {
        self.store.sync()?;
        let stored = read_config(self.store.as_ref())?;
        let current = self.get_config();

        let mut events = Vec::new();
        if stored.interval_seconds != current.interval_seconds {
            events.push(ConfigEvent::IntervalChanged(stored.interval_seconds));
        }
        if stored.watch_list != current.watch_list {
            events.push(ConfigEvent::WatchListChanged);
        }
        if events.is_empty() {
            return Ok(events);
        }

        info!(
            "Settings changed externally: interval {}s, {} watched containers",
            stored.interval_seconds,
            stored.watch_list.len()
        );
        self.swap(stored);
        for event in &events {
            self.emit(*event);
        }
        Ok(events)
    }

    /// Spawn a task that applies store change notifications via
    /// [`reload_from_store`](Self::reload_from_store).
    pub fn spawn_store_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut changes = manager.store.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => debug!("Settings key {} changed", change.key),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("Missed {} settings notifications", missed)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                if let Err(e) = manager.reload_from_store() {
                    warn!("Ignoring unreadable settings: {}", e);
                }
            }
        })
    }

    fn swap(&self, next: MonitorConfig) {
        *self.current.write() = Arc::new(next);
    }

    fn emit(&self, event: ConfigEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Read and normalize the stored configuration.
fn read_config(store: &dyn SettingsStore) -> Result<MonitorConfig, ConfigError> {
    let interval = match store.get_int(REFRESH_INTERVAL_KEY)? {
        None => DEFAULT_INTERVAL_SECS,
        Some(seconds) => clamp_interval(seconds).unwrap_or_else(|_| {
            warn!(
                "Stored {} of {} is not positive, using {}s",
                REFRESH_INTERVAL_KEY, seconds, DEFAULT_INTERVAL_SECS
            );
            DEFAULT_INTERVAL_SECS
        }),
    };
    let names = store.get_strv(MONITORED_CONTAINERS_KEY)?.unwrap_or_default();
    Ok(MonitorConfig::new(interval, names))
}
