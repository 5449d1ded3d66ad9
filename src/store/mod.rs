//! Settings store boundary.
//!
//! The monitor's persistent settings are two keys in a key/value store that
//! notifies on change. [`SettingsStore`] is the narrow contract the engine
//! needs; [`MemorySettings`] backs tests and embedding, [`JsonFileSettings`]
//! persists to a JSON file and notices edits made by other processes.

mod file;
mod memory;

pub use file::JsonFileSettings;
pub use memory::MemorySettings;

use std::fmt::Debug;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Poll interval in seconds (integer).
pub const REFRESH_INTERVAL_KEY: &str = "refresh-interval";

/// Watched container names (string list, order preserved).
pub const MONITORED_CONTAINERS_KEY: &str = "monitored-containers";

/// Capacity of each store's change-notification channel.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    StrList(Vec<String>),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Int(_) => "integer",
            SettingValue::StrList(_) => "string list",
        }
    }
}

/// Notification that a key's value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub key: String,
}

impl SettingsChange {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Errors raised by settings stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("setting {key} should be a {expected}, found a {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Key/value settings with change notifications.
///
/// `set` notifies subscribers only when the stored value actually changes.
pub trait SettingsStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, StoreError>;

    fn set(&self, key: &str, value: SettingValue) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange>;

    /// Pick up edits made outside this process that have not been noticed
    /// yet. Stores with no outside writers have nothing to do.
    fn sync(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        match self.get(key)? {
            None => Ok(None),
            Some(SettingValue::Int(value)) => Ok(Some(value)),
            Some(other) => Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    fn get_strv(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        match self.get(key)? {
            None => Ok(None),
            Some(SettingValue::StrList(values)) => Ok(Some(values)),
            Some(other) => Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected: "string list",
                found: other.type_name(),
            }),
        }
    }

    fn set_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set(key, SettingValue::Int(value))
    }

    fn set_strv(&self, key: &str, values: Vec<String>) -> Result<(), StoreError> {
        self.set(key, SettingValue::StrList(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_reject_wrong_type() {
        let store = MemorySettings::new();
        store.set_int(MONITORED_CONTAINERS_KEY, 3).unwrap();

        let err = store.get_strv(MONITORED_CONTAINERS_KEY).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { expected: "string list", .. }));
        assert_eq!(store.get_int(MONITORED_CONTAINERS_KEY).unwrap(), Some(3));
    }

    #[test]
    fn setting_value_json_shape_is_plain() {
        let int: SettingValue = serde_json::from_str("15").unwrap();
        assert_eq!(int, SettingValue::Int(15));

        let list: SettingValue = serde_json::from_str(r#"["web","db"]"#).unwrap();
        assert_eq!(list, SettingValue::StrList(vec!["web".into(), "db".into()]));
    }
}
