use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::error::ApiError;

pub const HEADER_SESSION_ID: &str = "session_id";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_ACCOUNT_ID: &str = "chatgpt-account-id";
pub const HEADER_ORIGINATOR: &str = "originator";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for backend requests.
pub fn build_headers(config: &ApiConfig) -> Result<BTreeMap<String, String>, ApiError> {
    if config.access_token.trim().is_empty() {
        return Err(ApiError::MissingAccessToken);
    }

    let account_id = match config.account_id.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_owned(),
        _ => account_id_from_token(config.access_token.trim())
            .ok_or(ApiError::MissingAccountId)?,
    };

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {}", config.access_token.trim()),
    );
    headers.insert(HEADER_ACCOUNT_ID.to_owned(), account_id);
    headers.insert(HEADER_ACCEPT.to_owned(), "text/event-stream".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(
        HEADER_ORIGINATOR.to_owned(),
        config.originator.trim().to_owned(),
    );
    headers.insert(
        HEADER_USER_AGENT.to_owned(),
        config
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(default_user_agent),
    );

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    if let Some(session_id) = config.session_id.as_deref().map(str::trim) {
        if !session_id.is_empty() {
            headers.insert(HEADER_SESSION_ID.to_owned(), session_id.to_owned());
        }
    }

    Ok(headers)
}

/// Decode the account id claim from a JWT access token, locally and without
/// signature verification. Returns `None` for non-JWT tokens or tokens
/// missing the claim.
#[must_use]
pub fn account_id_from_token(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload_segment = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let decoded = decode_jwt_segment(payload_segment)?;
    let claims = serde_json::from_slice::<TokenClaims>(&decoded).ok()?;

    claims
        .auth
        .as_ref()
        .and_then(|auth| auth.chatgpt_account_id.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn decode_jwt_segment(segment: &str) -> Option<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| general_purpose::URL_SAFE.decode(segment))
        .ok()
}

fn default_user_agent() -> String {
    format!(
        "agent-runtime ({} {})",
        std::env::consts::OS,
        normalize_arch(std::env::consts::ARCH)
    )
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(rename = "https://api.openai.com/auth")]
    auth: Option<AuthClaims>,
}

#[derive(Debug, Deserialize)]
struct AuthClaims {
    #[serde(default)]
    chatgpt_account_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;

    use super::{account_id_from_token, build_headers, HEADER_ACCOUNT_ID, HEADER_AUTHORIZATION};
    use crate::config::ApiConfig;
    use crate::error::ApiError;

    pub(crate) fn token_with_account_id(account_id: &str) -> String {
        let claims = json!({
            "https://api.openai.com/auth": {"chatgpt_account_id": account_id}
        });
        let payload = serde_json::to_vec(&claims).expect("serialize token claims");
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(payload);
        format!("header.{payload}.signature")
    }

    #[test]
    fn account_id_is_decoded_locally_from_the_token() {
        let token = token_with_account_id("acct-123");
        assert_eq!(account_id_from_token(&token).as_deref(), Some("acct-123"));
    }

    #[test]
    fn malformed_tokens_yield_no_account_id() {
        assert_eq!(account_id_from_token("not-a-jwt"), None);
        assert_eq!(account_id_from_token("a.b.c.d"), None);
        assert_eq!(account_id_from_token("a.!!!.c"), None);
    }

    #[test]
    fn headers_carry_bearer_auth_and_account_identity() {
        let config = ApiConfig::new(token_with_account_id("acct-9"));
        let headers = build_headers(&config).expect("headers");

        assert!(headers
            .get(HEADER_AUTHORIZATION)
            .is_some_and(|value| value.starts_with("Bearer ")));
        assert_eq!(headers.get(HEADER_ACCOUNT_ID).map(String::as_str), Some("acct-9"));
        assert_eq!(
            headers.get("accept").map(String::as_str),
            Some("text/event-stream")
        );
    }

    #[test]
    fn explicit_account_id_overrides_token_claims() {
        let config = ApiConfig::new(token_with_account_id("from-token"))
            .with_account_id("explicit");
        let headers = build_headers(&config).expect("headers");
        assert_eq!(
            headers.get(HEADER_ACCOUNT_ID).map(String::as_str),
            Some("explicit")
        );
    }

    #[test]
    fn missing_token_and_missing_identity_are_distinct_errors() {
        let empty = ApiConfig::new("");
        assert!(matches!(
            build_headers(&empty),
            Err(ApiError::MissingAccessToken)
        ));

        let opaque = ApiConfig::new("opaque-token");
        assert!(matches!(
            build_headers(&opaque),
            Err(ApiError::MissingAccountId)
        ));
    }
}
