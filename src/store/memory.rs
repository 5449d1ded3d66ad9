//! In-memory settings store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::{SettingValue, SettingsChange, SettingsStore, StoreError, CHANGE_CHANNEL_CAPACITY};

/// A settings store held entirely in memory.
///
/// Used by tests and by embedders that persist settings themselves.
#[derive(Debug)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, SettingValue>>,
    changes: broadcast::Sender<SettingsChange>,
}

impl MemorySettings {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// Create a store pre-populated with `values`, without notifications.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.values.write();
            for (key, value) in values {
                map.insert(key.into(), value);
            }
        }
        store
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<(), StoreError> {
        let changed = {
            let mut values = self.values.write();
            if values.get(key) == Some(&value) {
                false
            } else {
                values.insert(key.to_string(), value);
                true
            }
        };

        if changed {
            let _ = self.changes.send(SettingsChange::new(key));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::REFRESH_INTERVAL_KEY;

    #[test]
    fn set_notifies_only_on_change() {
        let store = MemorySettings::new();
        let mut rx = store.subscribe();

        store.set_int(REFRESH_INTERVAL_KEY, 10).unwrap();
        assert_eq!(rx.try_recv().unwrap().key, REFRESH_INTERVAL_KEY);

        store.set_int(REFRESH_INTERVAL_KEY, 10).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn with_values_prepopulates() {
        let store = MemorySettings::with_values([(REFRESH_INTERVAL_KEY, SettingValue::Int(60))]);
        assert_eq!(store.get_int(REFRESH_INTERVAL_KEY).unwrap(), Some(60));
        assert_eq!(store.get_int("missing").unwrap(), None);
    }
}
