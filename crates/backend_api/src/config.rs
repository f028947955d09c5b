use std::collections::BTreeMap;
use std::time::Duration;

/// Default base URL for the responses backend.
pub const DEFAULT_BASE_URL: &str = "https://chatgpt.com/backend-api";

/// Normalize a base URL to the responses endpoint.
///
/// Rules: keep paths already ending in `/codex/responses`; append
/// `/responses` to paths ending in `/codex`; append `/codex/responses`
/// otherwise.
#[must_use]
pub fn normalize_endpoint(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/codex/responses") {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/codex") {
        return format!("{trimmed}/responses");
    }
    format!("{trimmed}/codex/responses")
}

/// Transport configuration for one backend client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bearer token passed to `Authorization`.
    pub access_token: String,
    /// Explicit account id; when absent it is decoded from the token.
    pub account_id: Option<String>,
    /// Base URL for backend endpoints.
    pub base_url: String,
    /// Client-origin identifier added to outgoing headers.
    pub originator: String,
    /// Optional `session_id` request header value.
    pub session_id: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            account_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            originator: "agent-runtime".to_string(),
            session_id: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = originator.into();
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_endpoint, ApiConfig, DEFAULT_BASE_URL};

    #[test]
    fn empty_base_urls_fall_back_to_the_default() {
        assert_eq!(
            normalize_endpoint(""),
            format!("{DEFAULT_BASE_URL}/codex/responses")
        );
        assert_eq!(
            normalize_endpoint("   "),
            format!("{DEFAULT_BASE_URL}/codex/responses")
        );
    }

    #[test]
    fn endpoint_suffix_rules_are_stable() {
        assert_eq!(
            normalize_endpoint("https://example.com/backend-api/"),
            "https://example.com/backend-api/codex/responses"
        );
        assert_eq!(
            normalize_endpoint("https://example.com/backend-api/codex"),
            "https://example.com/backend-api/codex/responses"
        );
        assert_eq!(
            normalize_endpoint("https://example.com/backend-api/codex/responses"),
            "https://example.com/backend-api/codex/responses"
        );
    }

    #[test]
    fn builder_methods_collect_transport_settings() {
        let config = ApiConfig::new("token")
            .with_base_url("https://relay.internal")
            .with_originator("relay-app")
            .with_session_id("sess-1")
            .insert_header("x-app-version", "2.1.0");

        assert_eq!(config.base_url, "https://relay.internal");
        assert_eq!(config.originator, "relay-app");
        assert_eq!(config.session_id.as_deref(), Some("sess-1"));
        assert_eq!(
            config.extra_headers.get("x-app-version").map(String::as_str),
            Some("2.1.0")
        );
    }
}
