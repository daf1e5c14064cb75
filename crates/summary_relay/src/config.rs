use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://bys.mthli.com";
pub const DEFAULT_INTERNAL_PAGE_PREFIX: &str = "chrome-extension://";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Summarization API origin; request builders and identity minting use it.
    pub base_url: String,
    /// Id a port sender must present to be served.
    pub extension_id: String,
    pub extension_version: String,
    /// URLs with this prefix open a tab instead of being fetched.
    pub internal_page_prefix: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout for one-shot calls; streams are not bounded.
    pub request_timeout: Duration,
    /// Delay before the stream transport reconnects after a retriable error.
    pub retry_delay: Duration,
    /// Consecutive retriable failures tolerated; `None` retries forever.
    pub max_retries: Option<usize>,
    /// Operations served by the one-shot HTTP relay instead of the stream relay.
    pub one_shot_operations: Vec<String>,
    pub json_content_types: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            extension_id: "summary-relay".to_string(),
            extension_version: env!("CARGO_PKG_VERSION").to_string(),
            internal_page_prefix: DEFAULT_INTERNAL_PAGE_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
            max_retries: None,
            one_shot_operations: Vec::new(),
            json_content_types: vec!["application/json".to_string()],
        }
    }
}

impl RelayConfig {
    pub fn is_internal_page(&self, url: &str) -> bool {
        !self.internal_page_prefix.is_empty() && url.starts_with(&self.internal_page_prefix)
    }

    pub fn is_json_content_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();
        self.json_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    }

    pub fn is_one_shot(&self, operation: &str) -> bool {
        self.one_shot_operations.iter().any(|op| op == operation)
    }
}
