use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

/// Failures surfaced by the wire client.
///
/// Auth rejections are split out of the generic status variant because the
/// credential-gated transport owns the single refresh-and-retry for them.
#[derive(Debug)]
pub enum ApiError {
    MissingAccessToken,
    MissingAccountId,
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Unauthorized(String),
    RateLimited(String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    Cancelled,
    Unknown(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "access token is required"),
            Self::MissingAccountId => write!(f, "account id is required"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Unauthorized(message) => write!(f, "authorization rejected: {message}"),
            Self::RateLimited(message) => write!(f, "{message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::StreamFailed { code, message } => match code {
                Some(code) if !code.trim().is_empty() => {
                    write!(f, "stream failed ({code}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorFields>,
}

#[derive(Debug, Deserialize)]
struct ErrorFields {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    plan_type: Option<String>,
    resets_at: Option<u64>,
}

impl ErrorFields {
    fn usage_limit_message(&self, status: StatusCode) -> Option<String> {
        let code = self
            .code
            .as_deref()
            .and_then(non_empty)
            .or_else(|| self.type_.as_deref().and_then(non_empty))
            .unwrap_or("");
        if !matches_usage_limit(code, status) {
            return None;
        }

        let plan = self
            .plan_type
            .as_deref()
            .and_then(non_empty)
            .map(|value| format!(" ({} plan)", value.to_ascii_lowercase()))
            .unwrap_or_default();
        let mins = self
            .resets_at
            .filter(|value| *value > 0)
            .and_then(|reset_sec| (reset_sec as i64).checked_mul(1000))
            .and_then(|reset_millis| reset_millis.checked_sub(current_epoch_ms()))
            .map(|delta| (delta.max(0) as f64 / 60_000f64).round() as i64);
        let retry_hint = mins
            .map(|value| format!(" Try again in ~{value} min."))
            .unwrap_or_default();

        Some(
            format!("You have hit your usage limit{plan}.{retry_hint}")
                .trim()
                .to_string(),
        )
    }
}

/// Extract a human-readable message from an error response body, preferring
/// the backend's structured envelope and normalizing usage-limit rejections.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.to_string()
        }
    };

    let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return fallback();
    };

    if let Some(error) = parsed.error {
        if let Some(message) = error.usage_limit_message(status) {
            return message;
        }
        if let Some(message) = error.message.as_deref().and_then(non_empty) {
            return message.to_owned();
        }
    }

    fallback()
}

fn matches_usage_limit(code: &str, status: StatusCode) -> bool {
    matches!(status, StatusCode::TOO_MANY_REQUESTS)
        || code.eq_ignore_ascii_case("usage_limit_reached")
        || code.eq_ignore_ascii_case("usage_not_included")
        || code.eq_ignore_ascii_case("rate_limit_exceeded")
}

fn current_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::parse_error_message;

    #[test]
    fn structured_messages_win_over_the_raw_body() {
        let body = r#"{"error":{"message":"model not found"}}"#;
        assert_eq!(
            parse_error_message(StatusCode::NOT_FOUND, body),
            "model not found"
        );
    }

    #[test]
    fn usage_limit_rejections_are_normalized() {
        let body = r#"{"error":{"code":"usage_limit_reached","plan_type":"Plus"}}"#;
        let message = parse_error_message(StatusCode::TOO_MANY_REQUESTS, body);
        assert!(message.contains("usage limit"));
        assert!(message.contains("(plus plan)"));
    }

    #[test]
    fn unparseable_bodies_fall_back_to_the_body_or_status() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, ""),
            "Bad Gateway"
        );
    }
}
