//! Anonymous user identity and the authentication headers injected into relayed calls.
use relay_logging::{relay_debug, relay_info};
use serde::Deserialize;
use summary_core::{user_url, SettingKey};

use crate::{RelayConfig, RelayError, SettingsStore};

pub const UID_HEADER: &str = "X-UID";
pub const API_KEY_HEADER: &str = "X-OpenAI-API-Key";
pub const VERSION_HEADER: &str = "X-Extension-Version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub uid: String,
    pub api_key: Option<String>,
    pub extension_version: String,
}

impl AuthHeaders {
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header(UID_HEADER, self.uid.as_str())
            .header(VERSION_HEADER, self.extension_version.as_str());
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_str()),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MintedUser {
    uid: String,
}

/// Returns the persisted anonymous id, minting and storing one on first use.
///
/// Concurrent first calls may each mint an id remotely; `set_if_absent`
/// makes every caller observe the single id that was persisted.
pub async fn ensure_uid(
    store: &dyn SettingsStore,
    client: &reqwest::Client,
    config: &RelayConfig,
) -> Result<String, RelayError> {
    if let Some(uid) = store.get(SettingKey::Uid).await?.filter(|uid| !uid.is_empty()) {
        return Ok(uid);
    }

    let minted = mint_uid(client, config).await?;
    let stored = store.set_if_absent(SettingKey::Uid, &minted).await?;
    if stored == minted {
        relay_info!("persisted new anonymous id");
    } else {
        relay_debug!("another caller persisted the anonymous id first");
    }
    Ok(stored)
}

async fn mint_uid(client: &reqwest::Client, config: &RelayConfig) -> Result<String, RelayError> {
    let response = client
        .post(user_url(&config.base_url))
        .header(VERSION_HEADER, config.extension_version.as_str())
        .timeout(config.request_timeout)
        .send()
        .await
        .map_err(RelayError::from_transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Identity(format!("status={}", status.as_u16())));
    }
    let minted: MintedUser = response.json().await.map_err(RelayError::Decode)?;
    if minted.uid.trim().is_empty() {
        return Err(RelayError::Identity("server returned an empty uid".into()));
    }
    Ok(minted.uid)
}

/// Reads the settings a relayed call needs; the API key is optional.
pub async fn auth_headers(
    store: &dyn SettingsStore,
    client: &reqwest::Client,
    config: &RelayConfig,
) -> Result<AuthHeaders, RelayError> {
    let uid = ensure_uid(store, client, config).await?;
    let api_key = store
        .get(SettingKey::OpenAiApiKey)
        .await?
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());
    Ok(AuthHeaders {
        uid,
        api_key,
        extension_version: config.extension_version.clone(),
    })
}
