//! App-relay transport: the same wire shape routed through a relay host
//! with an app-issued bearer token instead of user credentials.

use async_trait::async_trait;

use backend_api::{ApiClient, ApiConfig};
use turn_protocol::cancel::CancelSignal;
use turn_protocol::error::SdkResult;
use turn_protocol::transport::{EventSink, Transport, TurnOutcome, TurnRequest};

use crate::classify::classify_api_error;
use crate::direct::run_turn;

/// Relay coordinates. App tokens are opaque, so the account header value
/// is supplied explicitly rather than decoded from the token.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub app_token: String,
    pub app_id: String,
}

pub struct RelayTransport {
    client: ApiClient,
}

impl RelayTransport {
    pub fn new(config: RelayConfig) -> SdkResult<Self> {
        let api_config = ApiConfig::new(config.app_token)
            .with_base_url(config.base_url)
            .with_account_id(config.app_id)
            .with_originator("agent-runtime-relay");
        let client = ApiClient::new(api_config).map_err(classify_api_error)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn name(&self) -> &str {
        "relay"
    }

    async fn run(
        &self,
        request: TurnRequest,
        cancel: CancelSignal,
        sink: EventSink<'_>,
    ) -> SdkResult<TurnOutcome> {
        run_turn(&self.client, &request, &cancel, sink)
            .await
            .map_err(classify_api_error)
    }
}
