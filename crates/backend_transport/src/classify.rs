//! Wire-error classification into the boundary taxonomy.

use backend_api::ApiError;
use turn_protocol::error::SdkError;

/// Map a wire-client failure onto the closed boundary taxonomy.
///
/// Retryability follows the error class: network and stream failures retry,
/// auth and validation rejections do not, cancellation never does.
#[must_use]
pub fn classify_api_error(error: ApiError) -> SdkError {
    match error {
        ApiError::Cancelled => SdkError::cancelled(),
        ApiError::Unauthorized(message) => SdkError::auth_rejected(message),
        ApiError::RateLimited(message) => SdkError::rate_limited(message),
        ApiError::Status(status, message) => {
            if status.is_server_error() {
                SdkError::server_error(message)
            } else {
                SdkError::invalid_request(message)
            }
        }
        ApiError::Request(source) => SdkError::network(source.to_string()),
        ApiError::StreamFailed { .. } => SdkError::stream_failed(error.to_string()),
        ApiError::RetryExhausted { .. } => SdkError::network(error.to_string()),
        ApiError::MissingAccessToken | ApiError::MissingAccountId => {
            SdkError::missing_credentials(error.to_string())
        }
        ApiError::Serde(source) => SdkError::config(source.to_string()),
        ApiError::InvalidHeader(message) | ApiError::Unknown(message) => {
            SdkError::config(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use backend_api::ApiError;
    use reqwest::StatusCode;
    use turn_protocol::error::ErrorCode;

    use super::classify_api_error;

    #[test]
    fn cancellation_classifies_as_the_cancellation_code() {
        let error = classify_api_error(ApiError::Cancelled);
        assert!(error.is_cancellation());
        assert!(!error.retryable());
    }

    #[test]
    fn status_classes_split_between_server_and_request_errors() {
        let server = classify_api_error(ApiError::Status(
            StatusCode::BAD_GATEWAY,
            "upstream".to_string(),
        ));
        assert_eq!(server.code(), ErrorCode::ServerError);
        assert!(server.retryable());

        let client = classify_api_error(ApiError::Status(
            StatusCode::UNPROCESSABLE_ENTITY,
            "bad input".to_string(),
        ));
        assert_eq!(client.code(), ErrorCode::InvalidRequest);
        assert!(!client.retryable());
    }

    #[test]
    fn auth_rejections_are_terminal_for_the_caller() {
        let error = classify_api_error(ApiError::Unauthorized("expired".to_string()));
        assert_eq!(error.code(), ErrorCode::AuthRejected);
        assert!(!error.retryable());
    }

    #[test]
    fn stream_and_exhaustion_failures_stay_retryable() {
        let stream = classify_api_error(ApiError::StreamFailed {
            code: None,
            message: "dropped".to_string(),
        });
        assert_eq!(stream.code(), ErrorCode::StreamFailed);
        assert!(stream.retryable());

        let exhausted = classify_api_error(ApiError::RetryExhausted {
            status: None,
            last_error: Some("reset".to_string()),
        });
        assert_eq!(exhausted.code(), ErrorCode::Network);
        assert!(exhausted.retryable());
    }

    #[test]
    fn missing_token_material_classifies_as_missing_credentials() {
        let error = classify_api_error(ApiError::MissingAccessToken);
        assert_eq!(error.code(), ErrorCode::MissingCredentials);
    }
}
