use std::sync::Arc;

use relay_logging::{relay_debug, relay_info, relay_warn};
use serde_json::Value;
use summary_core::{Envelope, RequestInit};

use crate::identity::auth_headers;
use crate::{RelayConfig, RelayError, SenderInfo, SettingsStore};

/// Opens extension-internal pages in a new browser tab.
pub trait TabOpener: Send + Sync {
    fn open_tab(&self, url: &str);
}

/// A `REQUEST` envelope that passed sender and shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub url: String,
    pub init: RequestInit,
}

/// Checks the sender is this extension and the envelope is a `REQUEST` with a URL.
pub fn validate(
    config: &RelayConfig,
    sender: &SenderInfo,
    envelope: &Envelope,
) -> Result<ValidatedRequest, RelayError> {
    if sender.id.as_deref() != Some(config.extension_id.as_str()) {
        return Err(RelayError::InvalidSender(sender.display_id().to_string()));
    }
    match envelope {
        Envelope::Request {
            request_url: Some(url),
            request_init,
        } if !url.is_empty() => Ok(ValidatedRequest {
            url: url.clone(),
            init: request_init.clone().unwrap_or_default(),
        }),
        other => Err(RelayError::InvalidRequest(other.to_json())),
    }
}

/// Like [`validate`], for a raw frame that may not even decode.
pub fn validate_frame(
    config: &RelayConfig,
    sender: &SenderInfo,
    frame: Value,
) -> Result<ValidatedRequest, RelayError> {
    if sender.id.as_deref() != Some(config.extension_id.as_str()) {
        return Err(RelayError::InvalidSender(sender.display_id().to_string()));
    }
    let raw = frame.to_string();
    let envelope = Envelope::from_value(frame).map_err(|_| RelayError::InvalidRequest(raw))?;
    validate(config, sender, &envelope)
}

/// Shared network state of the relays: configuration, HTTP client and settings.
pub(crate) struct RelayContext {
    pub(crate) config: RelayConfig,
    pub(crate) client: reqwest::Client,
    pub(crate) settings: Arc<dyn SettingsStore>,
}

impl RelayContext {
    pub(crate) fn new(
        config: RelayConfig,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(RelayError::Network)?;
        Ok(Self {
            config,
            client,
            settings,
        })
    }

    /// Builds the caller's request with the relay's authentication headers added.
    pub(crate) async fn authorized_request(
        &self,
        request: &ValidatedRequest,
    ) -> Result<reqwest::RequestBuilder, RelayError> {
        let url = reqwest::Url::parse(&request.url).map_err(|err| RelayError::InvalidUrl {
            url: request.url.clone(),
            reason: err.to_string(),
        })?;
        let method_name = request.init.method_or_default().to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| RelayError::InvalidMethod(method_name.clone()))?;

        let auth = auth_headers(self.settings.as_ref(), &self.client, &self.config).await?;

        let mut builder = self.client.request(method, url);
        if let Some(headers) = &request.init.headers {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        builder = auth.apply(builder);
        if let Some(body) = &request.init.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }
}

/// One-shot relay: one `REQUEST` in, one `RESPONSE` or `ERROR` out.
#[derive(Clone)]
pub struct HttpRelay {
    ctx: Arc<RelayContext>,
    tabs: Arc<dyn TabOpener>,
}

impl HttpRelay {
    pub fn new(
        config: RelayConfig,
        settings: Arc<dyn SettingsStore>,
        tabs: Arc<dyn TabOpener>,
    ) -> Result<Self, RelayError> {
        let ctx = RelayContext::new(config, settings)?;
        Ok(Self::from_context(Arc::new(ctx), tabs))
    }

    pub(crate) fn from_context(ctx: Arc<RelayContext>, tabs: Arc<dyn TabOpener>) -> Self {
        Self { ctx, tabs }
    }

    /// Validates, then executes. Rejections never touch the network.
    pub async fn handle(&self, sender: &SenderInfo, envelope: Envelope) -> Envelope {
        match validate(&self.ctx.config, sender, &envelope) {
            Ok(request) => self.execute(&request).await,
            Err(err) => {
                relay_warn!("runtime message rejected: {}", err);
                Envelope::error(err.to_record())
            }
        }
    }

    pub async fn execute(&self, request: &ValidatedRequest) -> Envelope {
        if self.ctx.config.is_internal_page(&request.url) {
            relay_info!("opening internal page url={}", request.url);
            self.tabs.open_tab(&request.url);
            return Envelope::response(true, None);
        }

        match self.fetch(request).await {
            Ok((ok, json)) => Envelope::response(ok, Some(json)),
            Err(err) => {
                relay_warn!("fetch failed url={}: {}", request.url, err);
                Envelope::error(err.to_record())
            }
        }
    }

    /// Performs the call and decodes the JSON body whatever the status.
    ///
    /// Returns the transport success flag alongside the body; callers decide
    /// what a non-OK status means.
    pub async fn fetch(&self, request: &ValidatedRequest) -> Result<(bool, Value), RelayError> {
        let builder = self
            .ctx
            .authorized_request(request)
            .await?
            .timeout(self.ctx.config.request_timeout);
        let response = builder.send().await.map_err(RelayError::from_transport)?;
        let ok = response.status().is_success();
        let json: Value = response.json().await.map_err(RelayError::Decode)?;
        relay_debug!(
            "fetch done url={} ok={} json={}",
            request.url,
            ok,
            relay_logging::truncate_for_log(&json.to_string(), 200)
        );
        Ok((ok, json))
    }
}
