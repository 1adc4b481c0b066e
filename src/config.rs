//! Proxy Configuration
//!
//! Defines the immutable server configuration:
//! - Upstream credential and base URL
//! - Upstream timeout
//! - Defaults substituted into chat completion requests

use std::time::Duration;

/// Sentinel used when `NIM_API_KEY` is not set
pub const NOT_CONFIGURED: &str = "not-configured";

/// NVIDIA NIM API base URL
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// The single model family served through this proxy
pub const DEFAULT_MODEL: &str = "meta/llama-3.3-70b-instruct";

/// Upstream timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Keys of this length or shorter are reported as not configured by `/health`
const MIN_API_KEY_LEN: usize = 10;

/// Complete proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bearer credential injected into every upstream request
    pub api_key: String,
    /// Upstream base URL, without the `/chat/completions` suffix
    pub base_url: String,
    /// Bound on connect + response for every upstream call
    pub timeout: Duration,
    /// Values used for fields missing from inbound requests
    pub defaults: RequestDefaults,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_key: NOT_CONFIGURED.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            defaults: RequestDefaults::default(),
        }
    }
}

impl ProxyConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.defaults.model = model.into();
        self
    }

    /// False only when the key is still the sentinel value.
    pub fn has_api_key(&self) -> bool {
        self.api_key != NOT_CONFIGURED
    }

    /// Whether the key looks usable, as reported by `/health`.
    pub fn api_key_configured(&self) -> bool {
        self.has_api_key() && self.api_key.len() > MIN_API_KEY_LEN
    }

    /// Upstream chat completions endpoint
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Defaults for chat completion fields absent from the inbound body
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 1024,
            stream: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.api_key, NOT_CONFIGURED);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.defaults.model, DEFAULT_MODEL);
        assert!(!config.has_api_key());
        assert!(!config.api_key_configured());
    }

    #[test]
    fn test_api_key_configured_requires_length() {
        let short = ProxyConfig::new("abc", DEFAULT_BASE_URL);
        assert!(short.has_api_key());
        assert!(!short.api_key_configured());

        let exactly_ten = ProxyConfig::new("0123456789", DEFAULT_BASE_URL);
        assert!(!exactly_ten.api_key_configured());

        let long = ProxyConfig::new("nvapi-0123456789", DEFAULT_BASE_URL);
        assert!(long.api_key_configured());
    }

    #[test]
    fn test_chat_completions_url_trims_slash() {
        let config = ProxyConfig::new("key", "http://localhost:8000/v1/");
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );
    }
}
