//! Closed error taxonomy used at every public boundary.
//!
//! All internal failures normalize into exactly one of the four kinds before
//! crossing a crate boundary. Each value carries a machine-readable code and
//! a retryability verdict; cancellation is never retryable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for boundary-crossing results.
pub type SdkResult<T> = Result<T, SdkError>;

/// Machine-readable failure code with a stable string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidConfig,
    MissingCredentials,
    AuthRejected,
    RateLimited,
    ServerError,
    InvalidRequest,
    ContentPolicy,
    Network,
    Cancelled,
    StreamFailed,
    FlowStateMismatch,
    FlowTimeout,
    HookFailed,
    AgentBusy,
    SessionClosed,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfig => "invalid_config",
            Self::MissingCredentials => "missing_credentials",
            Self::AuthRejected => "auth_rejected",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidRequest => "invalid_request",
            Self::ContentPolicy => "content_policy",
            Self::Network => "network",
            Self::Cancelled => "cancelled",
            Self::StreamFailed => "stream_failed",
            Self::FlowStateMismatch => "flow_state_mismatch",
            Self::FlowTimeout => "flow_timeout",
            Self::HookFailed => "hook_failed",
            Self::AgentBusy => "agent_busy",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform boundary error: one of four kinds, each with a code, a message,
/// and a retryability verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SdkError {
    /// Invalid or missing setup. Never retryable.
    #[error("config error ({code}): {message}")]
    Config { code: ErrorCode, message: String },

    /// The backend rejected the request.
    #[error("provider error ({code}): {message}")]
    Provider {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },

    /// Network/transport failure or cancellation.
    #[error("request error ({code}): {message}")]
    Request {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },

    /// An externally supplied callback failed. Never retryable.
    #[error("hook '{hook_id}' failed ({code}): {message}")]
    Hook {
        code: ErrorCode,
        message: String,
        hook_id: String,
    },
}

impl SdkError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::InvalidConfig,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_credentials(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::MissingCredentials,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth_rejected(message: impl Into<String>) -> Self {
        Self::Provider {
            code: ErrorCode::AuthRejected,
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Provider {
            code: ErrorCode::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::Provider {
            code: ErrorCode::ServerError,
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::Provider {
            code: ErrorCode::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn content_policy(message: impl Into<String>) -> Self {
        Self::Provider {
            code: ErrorCode::ContentPolicy,
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Request {
            code: ErrorCode::Network,
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn stream_failed(message: impl Into<String>) -> Self {
        Self::Request {
            code: ErrorCode::StreamFailed,
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::Request {
            code: ErrorCode::Cancelled,
            message: "operation was cancelled".to_string(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn session_closed() -> Self {
        Self::Request {
            code: ErrorCode::SessionClosed,
            message: "session is closed".to_string(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn busy() -> Self {
        Self::Request {
            code: ErrorCode::AgentBusy,
            message: "a turn is already active".to_string(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn hook(hook_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            code: ErrorCode::HookFailed,
            message: message.into(),
            hook_id: hook_id.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config { code, .. }
            | Self::Provider { code, .. }
            | Self::Request { code, .. }
            | Self::Hook { code, .. } => *code,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message, .. }
            | Self::Provider { message, .. }
            | Self::Request { message, .. }
            | Self::Hook { message, .. } => message,
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Config { .. } | Self::Hook { .. } => false,
            Self::Provider { retryable, .. } | Self::Request { retryable, .. } => *retryable,
        }
    }

    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.code() == ErrorCode::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, SdkError};

    #[test]
    fn cancellation_is_a_request_error_and_never_retryable() {
        let error = SdkError::cancelled();
        assert!(matches!(error, SdkError::Request { .. }));
        assert_eq!(error.code(), ErrorCode::Cancelled);
        assert!(!error.retryable());
        assert!(error.is_cancellation());
    }

    #[test]
    fn config_and_hook_errors_are_never_retryable() {
        assert!(!SdkError::config("bad setup").retryable());
        assert!(!SdkError::missing_credentials("no token file").retryable());
        assert!(!SdkError::hook("pre_turn", "callback panicked").retryable());
    }

    #[test]
    fn provider_retryability_follows_rejection_class() {
        assert!(SdkError::rate_limited("slow down").retryable());
        assert!(SdkError::server_error("upstream 503").retryable());
        assert!(!SdkError::auth_rejected("bad token").retryable());
        assert!(!SdkError::invalid_request("malformed input").retryable());
        assert!(!SdkError::content_policy("refused").retryable());
    }

    #[test]
    fn hook_errors_carry_the_originating_hook_identity() {
        let error = SdkError::hook("post_turn", "sink returned an error");
        match &error {
            SdkError::Hook { hook_id, .. } => assert_eq!(hook_id, "post_turn"),
            other => panic!("expected hook error, got {other:?}"),
        }
        assert!(error.to_string().contains("post_turn"));
    }

    // Compile-time exhaustiveness: adding an ErrorCode variant without a
    // retryability ruling here fails this match.
    #[test]
    fn every_error_code_has_a_classification_ruling() {
        let all = [
            ErrorCode::InvalidConfig,
            ErrorCode::MissingCredentials,
            ErrorCode::AuthRejected,
            ErrorCode::RateLimited,
            ErrorCode::ServerError,
            ErrorCode::InvalidRequest,
            ErrorCode::ContentPolicy,
            ErrorCode::Network,
            ErrorCode::Cancelled,
            ErrorCode::StreamFailed,
            ErrorCode::FlowStateMismatch,
            ErrorCode::FlowTimeout,
            ErrorCode::HookFailed,
            ErrorCode::AgentBusy,
            ErrorCode::SessionClosed,
        ];

        for code in all {
            let expected_retryable = match code {
                ErrorCode::RateLimited
                | ErrorCode::ServerError
                | ErrorCode::Network
                | ErrorCode::StreamFailed => true,
                ErrorCode::InvalidConfig
                | ErrorCode::MissingCredentials
                | ErrorCode::AuthRejected
                | ErrorCode::InvalidRequest
                | ErrorCode::ContentPolicy
                | ErrorCode::Cancelled
                | ErrorCode::FlowStateMismatch
                | ErrorCode::FlowTimeout
                | ErrorCode::HookFailed
                | ErrorCode::AgentBusy
                | ErrorCode::SessionClosed => false,
            };

            let representative = representative_error(code);
            assert_eq!(
                representative.retryable(),
                expected_retryable,
                "retryability ruling drifted for {code}"
            );
            assert_eq!(representative.code(), code);
        }
    }

    fn representative_error(code: ErrorCode) -> SdkError {
        match code {
            ErrorCode::InvalidConfig => SdkError::config("x"),
            ErrorCode::MissingCredentials => SdkError::missing_credentials("x"),
            ErrorCode::AuthRejected => SdkError::auth_rejected("x"),
            ErrorCode::RateLimited => SdkError::rate_limited("x"),
            ErrorCode::ServerError => SdkError::server_error("x"),
            ErrorCode::InvalidRequest => SdkError::invalid_request("x"),
            ErrorCode::ContentPolicy => SdkError::content_policy("x"),
            ErrorCode::Network => SdkError::network("x"),
            ErrorCode::Cancelled => SdkError::cancelled(),
            ErrorCode::StreamFailed => SdkError::Request {
                code: ErrorCode::StreamFailed,
                message: "x".to_string(),
                retryable: true,
            },
            ErrorCode::FlowStateMismatch => SdkError::Provider {
                code: ErrorCode::FlowStateMismatch,
                message: "x".to_string(),
                retryable: false,
            },
            ErrorCode::FlowTimeout => SdkError::Request {
                code: ErrorCode::FlowTimeout,
                message: "x".to_string(),
                retryable: false,
            },
            ErrorCode::HookFailed => SdkError::hook("h", "x"),
            ErrorCode::AgentBusy => SdkError::busy(),
            ErrorCode::SessionClosed => SdkError::session_closed(),
        }
    }

    #[test]
    fn serialized_errors_expose_kind_and_code() {
        let value = serde_json::to_value(SdkError::rate_limited("slow down"))
            .expect("serialize provider error");
        assert_eq!(value["kind"], "provider");
        assert_eq!(value["code"], "rate_limited");
        assert_eq!(value["retryable"], true);
    }
}
