//! Credential-gated transport: fresh token before every call, and at most
//! one forced refresh-and-retry on an auth rejection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use backend_api::{ApiClient, ApiConfig, ApiError};
use backend_auth::{CredentialManager, Credentials};
use turn_protocol::cancel::CancelSignal;
use turn_protocol::error::{SdkError, SdkResult};
use turn_protocol::transport::{EventSink, Transport, TurnOutcome, TurnRequest};

use crate::classify::classify_api_error;
use crate::direct::run_turn;

/// Transport that resolves credentials per call through a
/// [`CredentialManager`]. An auth rejection on a freshly minted token gets
/// exactly one forced refresh and retry; a second rejection is terminal.
///
/// Auth rejections happen before any stream bytes arrive, so the retry
/// never re-emits events.
pub struct CredentialGatedTransport {
    manager: Arc<CredentialManager>,
    base: ApiConfig,
}

impl CredentialGatedTransport {
    #[must_use]
    pub fn new(manager: Arc<CredentialManager>, base: ApiConfig) -> Self {
        Self { manager, base }
    }

    fn client_for(&self, credentials: &Credentials) -> Result<ApiClient, ApiError> {
        let mut config = self.base.clone();
        config.access_token = credentials.access_token.clone();
        config.account_id = credentials.account_id.clone();
        ApiClient::new(config)
    }

    async fn attempt(
        &self,
        credentials: &Credentials,
        request: &TurnRequest,
        cancel: &CancelSignal,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, ApiError> {
        let client = self.client_for(credentials)?;
        run_turn(&client, request, cancel, sink).await
    }
}

#[async_trait]
impl Transport for CredentialGatedTransport {
    fn name(&self) -> &str {
        "credential-gated"
    }

    async fn run(
        &self,
        request: TurnRequest,
        cancel: CancelSignal,
        sink: EventSink<'_>,
    ) -> SdkResult<TurnOutcome> {
        let credentials = self
            .manager
            .fresh_credentials(&cancel)
            .await
            .map_err(SdkError::from)?;

        match self
            .attempt(&credentials, &request, &cancel, &mut *sink)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(ApiError::Unauthorized(message)) => {
                debug!("auth rejection on a fresh token, forcing one refresh");
                let refreshed = self
                    .manager
                    .refreshed_after(&credentials.access_token, &cancel)
                    .await
                    .map_err(SdkError::from)?;

                match self
                    .attempt(&refreshed, &request, &cancel, &mut *sink)
                    .await
                {
                    Ok(outcome) => Ok(outcome),
                    // Second rejection: the account is out, not the token.
                    Err(ApiError::Unauthorized(second)) => {
                        Err(SdkError::auth_rejected(second))
                    }
                    Err(other) => Err(classify_api_error(other)),
                }
                .map_err(|error| {
                    debug!(first_rejection = %message, "gated retry did not recover");
                    error
                })
            }
            Err(other) => Err(classify_api_error(other)),
        }
    }
}
