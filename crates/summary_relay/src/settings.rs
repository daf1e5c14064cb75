use std::collections::BTreeMap;

use async_trait::async_trait;
use summary_core::SettingKey;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::persist::PersistError;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is malformed: {0}")]
    Parse(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub key: SettingKey,
    /// `None` when the key was removed.
    pub value: Option<String>,
}

/// Extension-wide key-value settings, injected into the relay and UI code.
///
/// Implementations serialize their own writes; callers never lock around them.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError>;

    async fn set(&self, key: SettingKey, value: &str) -> Result<(), SettingsError>;

    async fn remove(&self, key: SettingKey) -> Result<(), SettingsError>;

    /// Stores `value` only when `key` holds nothing (or an empty string) and
    /// returns whatever ended up stored.
    async fn set_if_absent(&self, key: SettingKey, value: &str) -> Result<String, SettingsError>;

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange>;
}

/// In-memory store used by tests and embedders without persistence.
#[derive(Debug)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<SettingKey, String>>,
    changes: broadcast::Sender<SettingsChange>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            values: Mutex::new(BTreeMap::new()),
            changes,
        }
    }
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (SettingKey, String)>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            values: Mutex::new(values.into_iter().collect()),
            changes,
        }
    }

    fn notify(&self, key: SettingKey, value: Option<String>) {
        // No subscribers is fine.
        let _ = self.changes.send(SettingsChange { key, value });
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        Ok(self.values.lock().await.get(&key).cloned())
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<(), SettingsError> {
        self.values.lock().await.insert(key, value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: SettingKey) -> Result<(), SettingsError> {
        if self.values.lock().await.remove(&key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: SettingKey, value: &str) -> Result<String, SettingsError> {
        let mut values = self.values.lock().await;
        match values.get(&key) {
            Some(existing) if !existing.is_empty() => Ok(existing.clone()),
            _ => {
                values.insert(key, value.to_string());
                drop(values);
                self.notify(key, Some(value.to_string()));
                Ok(value.to_string())
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_keeps_the_first_value() {
        let store = MemorySettings::new();
        let mut changes = store.subscribe();

        assert_eq!(store.set_if_absent(SettingKey::Uid, "a").await.unwrap(), "a");
        assert_eq!(store.set_if_absent(SettingKey::Uid, "b").await.unwrap(), "a");
        assert_eq!(
            changes.recv().await.unwrap(),
            SettingsChange {
                key: SettingKey::Uid,
                value: Some("a".into()),
            }
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_values_count_as_absent() {
        let store = MemorySettings::with_values([(SettingKey::Uid, String::new())]);
        assert_eq!(store.set_if_absent(SettingKey::Uid, "x").await.unwrap(), "x");
        store.remove(SettingKey::Uid).await.unwrap();
        assert_eq!(store.get(SettingKey::Uid).await.unwrap(), None);
    }
}
