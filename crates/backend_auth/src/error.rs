use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use turn_protocol::error::{ErrorCode, SdkError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credential file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize credentials: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("no credential file location available on this platform")]
    NoHomeDirectory,

    #[error("failed to bind loopback callback listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("no stored credentials; complete a login first")]
    NotAuthenticated,

    #[error("token endpoint rejected the request (HTTP {status}): {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token response is missing required field '{0}'")]
    MalformedGrant(&'static str),

    #[error("access token carries no account identity")]
    MissingIdentity,

    #[error("authorization callback returned a mismatched state value")]
    StateMismatch,

    #[error("authorization callback carried no authorization code")]
    MissingCode,

    #[error("no authorization callback arrived within {0:?}")]
    FlowTimeout(Duration),

    #[error("authorization flow was cancelled")]
    Cancelled,

    #[error("invalid authorization endpoint URL: {0}")]
    InvalidEndpoint(String),
}

impl AuthError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<AuthError> for SdkError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Io { .. }
            | AuthError::Parse { .. }
            | AuthError::Serialize(_)
            | AuthError::NoHomeDirectory
            | AuthError::Bind(_)
            | AuthError::InvalidEndpoint(_) => SdkError::config(error.to_string()),
            AuthError::NotAuthenticated => SdkError::missing_credentials(error.to_string()),
            // Authorization codes are single-use, so exchange rejections are
            // never retryable regardless of status class.
            AuthError::TokenEndpoint { .. }
            | AuthError::MalformedGrant(_)
            | AuthError::MissingIdentity => SdkError::auth_rejected(error.to_string()),
            AuthError::StateMismatch | AuthError::MissingCode => SdkError::Provider {
                code: ErrorCode::FlowStateMismatch,
                message: error.to_string(),
                retryable: false,
            },
            AuthError::FlowTimeout(_) => SdkError::Request {
                code: ErrorCode::FlowTimeout,
                message: error.to_string(),
                retryable: false,
            },
            AuthError::Cancelled => SdkError::cancelled(),
            AuthError::Http(source) => SdkError::network(source.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use turn_protocol::error::{ErrorCode, SdkError};

    use super::AuthError;

    #[test]
    fn exchange_rejections_classify_as_non_retryable_auth_errors() {
        let error: SdkError = AuthError::TokenEndpoint {
            status: 400,
            message: "invalid_grant".to_string(),
        }
        .into();

        assert_eq!(error.code(), ErrorCode::AuthRejected);
        assert!(!error.retryable());
    }

    #[test]
    fn callback_outcomes_map_to_flow_codes() {
        let mismatch: SdkError = AuthError::StateMismatch.into();
        assert_eq!(mismatch.code(), ErrorCode::FlowStateMismatch);

        let timeout: SdkError = AuthError::FlowTimeout(Duration::from_secs(60)).into();
        assert_eq!(timeout.code(), ErrorCode::FlowTimeout);
        assert!(!timeout.retryable());

        let cancelled: SdkError = AuthError::Cancelled.into();
        assert!(cancelled.is_cancellation());
    }

    #[test]
    fn missing_credentials_classify_as_config() {
        let error: SdkError = AuthError::NotAuthenticated.into();
        assert_eq!(error.code(), ErrorCode::MissingCredentials);
        assert!(matches!(error, SdkError::Config { .. }));
    }
}
