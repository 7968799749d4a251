use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1993";
pub const DEFAULT_PROVIDER_ID: &str = "anthropic";
pub const DEFAULT_MODEL_ID: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 120;

/// Settings consumed by the chat and event clients. The embedder owns
/// persistence; this struct only carries the values and their fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenCodeConfig {
    pub base_url: String,
    pub provider_id: String,
    pub model_id: String,
    pub timeout_seconds: i64,
}

impl Default for OpenCodeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl OpenCodeConfig {
    /// Base URL with blank values falling back to the default.
    pub fn base_url(&self) -> &str {
        if self.base_url.trim().is_empty() {
            DEFAULT_BASE_URL
        } else {
            &self.base_url
        }
    }

    /// The configured base URL when it differs from the default. A custom
    /// value means the server is managed externally and the chat client
    /// should talk to it directly instead of driving the local lifecycle.
    pub fn custom_base_url(&self) -> Option<String> {
        let url = self.base_url().trim_end_matches('/');
        if url == DEFAULT_BASE_URL {
            None
        } else {
            Some(url.to_string())
        }
    }

    pub fn provider_id(&self) -> &str {
        if self.provider_id.trim().is_empty() {
            DEFAULT_PROVIDER_ID
        } else {
            &self.provider_id
        }
    }

    pub fn model_id(&self) -> &str {
        if self.model_id.trim().is_empty() {
            DEFAULT_MODEL_ID
        } else {
            &self.model_id
        }
    }

    /// Request timeout; non-positive values fall back to the default.
    pub fn request_timeout(&self) -> Duration {
        let seconds = if self.timeout_seconds > 0 {
            self.timeout_seconds
        } else {
            DEFAULT_TIMEOUT_SECONDS
        };
        Duration::from_secs(seconds as u64)
    }

    pub fn session_url(&self) -> String {
        format!("{}/session", self.base_url().trim_end_matches('/'))
    }

    pub fn session_message_url(&self, session_id: &str) -> String {
        format!(
            "{}/session/{}/message",
            self.base_url().trim_end_matches('/'),
            session_id
        )
    }

    pub fn config_url(&self) -> String {
        format!("{}/config", self.base_url().trim_end_matches('/'))
    }

    pub fn event_url(&self) -> String {
        format!("{}/event", self.base_url().trim_end_matches('/'))
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url().trim().is_empty()
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OpenCodeConfig::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.provider_id(), "anthropic");
        assert_eq!(config.model_id(), DEFAULT_MODEL_ID);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert!(config.is_configured());
        assert!(config.custom_base_url().is_none());
    }

    #[test]
    fn test_blank_fields_fall_back_to_defaults() {
        let config = OpenCodeConfig {
            base_url: "  ".to_string(),
            provider_id: String::new(),
            model_id: String::new(),
            timeout_seconds: 60,
        };
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.provider_id(), DEFAULT_PROVIDER_ID);
        assert_eq!(config.model_id(), DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_non_positive_timeout_uses_default() {
        let mut config = OpenCodeConfig::default();
        config.timeout_seconds = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        config.timeout_seconds = -5;
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        config.timeout_seconds = 30;
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_url_builders() {
        let config = OpenCodeConfig {
            base_url: "http://localhost:4096/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.session_url(), "http://localhost:4096/session");
        assert_eq!(
            config.session_message_url("ses_123"),
            "http://localhost:4096/session/ses_123/message"
        );
        assert_eq!(config.config_url(), "http://localhost:4096/config");
        assert_eq!(config.event_url(), "http://localhost:4096/event");
        assert_eq!(
            config.custom_base_url().as_deref(),
            Some("http://localhost:4096")
        );
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut config = OpenCodeConfig {
            base_url: "http://example.com".to_string(),
            provider_id: "openai".to_string(),
            model_id: "gpt-4".to_string(),
            timeout_seconds: 10,
        };
        config.reset_to_defaults();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }
}
