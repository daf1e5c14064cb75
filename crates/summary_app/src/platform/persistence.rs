use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use relay_logging::relay_info;
use serde::{Deserialize, Serialize};
use summary_core::SettingKey;
use summary_relay::{
    read_optional, AtomicFileWriter, RelayConfig, SettingsChange, SettingsError, SettingsStore,
};
use tokio::sync::{broadcast, Mutex};

pub(crate) const SETTINGS_FILENAME: &str = ".summary_settings.ron";

/// On-disk form of the settings; keys are the storage names of [`SettingKey`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedSettings {
    values: BTreeMap<String, String>,
}

/// Settings store backed by a RON file, rewritten atomically on every change.
pub(crate) struct RonSettingsStore {
    dir: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    changes: broadcast::Sender<SettingsChange>,
}

impl RonSettingsStore {
    /// Loads `{dir}/.summary_settings.ron`; a missing file is an empty store.
    pub(crate) fn open(dir: PathBuf) -> Result<Self, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        let persisted = match read_optional(&path)? {
            Some(content) => ron::from_str::<PersistedSettings>(&content)
                .map_err(|err| SettingsError::Parse(format!("{}: {}", path.display(), err)))?,
            None => PersistedSettings::default(),
        };
        relay_info!(
            "Loaded {} settings from {:?}",
            persisted.values.len(),
            path
        );

        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            dir,
            values: Mutex::new(persisted.values),
            changes,
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let state = PersistedSettings {
            values: values.clone(),
        };
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&state, pretty)
            .map_err(|err| SettingsError::Parse(err.to_string()))?;
        AtomicFileWriter::new(self.dir.clone()).write(SETTINGS_FILENAME, &content)?;
        Ok(())
    }

    fn notify(&self, key: SettingKey, value: Option<String>) {
        let _ = self.changes.send(SettingsChange { key, value });
    }
}

#[async_trait]
impl SettingsStore for RonSettingsStore {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        Ok(self.values.lock().await.get(key.as_str()).cloned())
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<(), SettingsError> {
        let mut values = self.values.lock().await;
        values.insert(key.as_str().to_string(), value.to_string());
        self.save(&values)?;
        drop(values);
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: SettingKey) -> Result<(), SettingsError> {
        let mut values = self.values.lock().await;
        if values.remove(key.as_str()).is_none() {
            return Ok(());
        }
        self.save(&values)?;
        drop(values);
        self.notify(key, None);
        Ok(())
    }

    async fn set_if_absent(&self, key: SettingKey, value: &str) -> Result<String, SettingsError> {
        let mut values = self.values.lock().await;
        if let Some(existing) = values.get(key.as_str()).filter(|v| !v.is_empty()) {
            return Ok(existing.clone());
        }
        values.insert(key.as_str().to_string(), value.to_string());
        self.save(&values)?;
        drop(values);
        self.notify(key, Some(value.to_string()));
        Ok(value.to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}

/// Optional overrides read from `relay.ron`; absent fields keep the defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    base_url: Option<String>,
    extension_id: Option<String>,
    internal_page_prefix: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    retry_delay_ms: Option<u64>,
    max_retries: Option<usize>,
    one_shot_operations: Option<Vec<String>>,
}

impl ConfigFile {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(extension_id) = self.extension_id {
            config.extension_id = extension_id;
        }
        if let Some(prefix) = self.internal_page_prefix {
            config.internal_page_prefix = prefix;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ms);
        }
        if self.max_retries.is_some() {
            config.max_retries = self.max_retries;
        }
        if let Some(operations) = self.one_shot_operations {
            config.one_shot_operations = operations;
        }
    }
}

/// Defaults overlaid with `path`, when it exists.
pub(crate) fn load_relay_config(path: &Path) -> anyhow::Result<RelayConfig> {
    let mut config = RelayConfig::default();
    match read_optional(path).with_context(|| format!("reading {}", path.display()))? {
        Some(content) => {
            let file: ConfigFile = ron::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            file.apply(&mut config);
            relay_info!("Loaded relay config from {:?}", path);
        }
        None => relay_info!("No relay config at {:?}; using defaults", path),
    }
    Ok(config)
}
