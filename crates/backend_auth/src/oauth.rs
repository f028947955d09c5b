//! Authorization-server wire client: authorize URL construction and the
//! code/refresh token grants.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use backend_api::account_id_from_token;
use turn_protocol::cancel::{await_or_cancel, CancelSignal};

use crate::error::AuthError;
use crate::pkce::AuthorizationFlowState;
use crate::store::{now_ms, Credentials};

pub const DEFAULT_ISSUER: &str = "https://auth.openai.com";
pub const DEFAULT_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
pub const DEFAULT_SCOPE: &str = "openid profile email offline_access";

pub(crate) const CALLBACK_PATH: &str = "/auth/callback";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorization-server coordinates. Defaults target the hosted issuer;
/// every endpoint is overridable for tests.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub scope: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            authorize_endpoint: format!("{DEFAULT_ISSUER}/oauth/authorize"),
            token_endpoint: format!("{DEFAULT_ISSUER}/oauth/token"),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}{CALLBACK_PATH}")
}

/// One token grant as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct WireGrant {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl TokenGrant {
    fn from_wire(wire: WireGrant) -> Result<Self, AuthError> {
        let access_token = wire
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MalformedGrant("access_token"))?;
        let expires_in = wire.expires_in.ok_or(AuthError::MalformedGrant("expires_in"))?;
        Ok(Self {
            access_token,
            refresh_token: wire.refresh_token,
            expires_in,
        })
    }

    /// Fold a grant into stored credentials. A refresh grant may omit the
    /// refresh token, in which case the previous one stays valid.
    pub fn into_credentials(
        self,
        previous_refresh: Option<String>,
    ) -> Result<Credentials, AuthError> {
        let account_id = account_id_from_token(&self.access_token);
        if account_id.is_none() {
            return Err(AuthError::MissingIdentity);
        }
        Ok(Credentials {
            expires_at_ms: now_ms().saturating_add(self.expires_in.saturating_mul(1_000)),
            refresh_token: self.refresh_token.or(previous_refresh),
            access_token: self.access_token,
            account_id,
        })
    }
}

pub struct OAuthClient {
    config: AuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// URL the user opens in a browser to begin the flow.
    pub fn authorize_url(&self, flow: &AuthorizationFlowState) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.config.authorize_endpoint)
            .map_err(|err| AuthError::InvalidEndpoint(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &redirect_uri(flow.redirect_port))
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &flow.state)
            .append_pair("code_challenge", &flow.pkce.challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.into())
    }

    /// Exchange the single-use authorization code for a token grant.
    pub async fn exchange_code(
        &self,
        code: &str,
        flow: &AuthorizationFlowState,
        cancel: &CancelSignal,
    ) -> Result<TokenGrant, AuthError> {
        debug!(port = flow.redirect_port, "exchanging authorization code");
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", &redirect_uri(flow.redirect_port)),
            ("code_verifier", flow.pkce.verifier.as_str()),
        ];
        self.token_request(&form, cancel).await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        cancel: &CancelSignal,
    ) -> Result<TokenGrant, AuthError> {
        debug!("refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form, cancel).await
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        cancel: &CancelSignal,
    ) -> Result<TokenGrant, AuthError> {
        let request = self.http.post(&self.config.token_endpoint).form(form).send();
        let response = await_or_cancel(request, cancel)
            .await
            .ok_or(AuthError::Cancelled)??;

        let status = response.status();
        if !status.is_success() {
            let message = await_or_cancel(response.text(), cancel)
                .await
                .ok_or(AuthError::Cancelled)?
                .unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        let wire: WireGrant = await_or_cancel(response.json(), cancel)
            .await
            .ok_or(AuthError::Cancelled)??;
        TokenGrant::from_wire(wire)
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{AuthConfig, OAuthClient, TokenGrant, WireGrant};
    use crate::error::AuthError;
    use crate::pkce::AuthorizationFlowState;
    use crate::store::now_ms;

    fn token_with_account_id(account_id: &str) -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let claims = serde_json::json!({
            "https://api.openai.com/auth": { "chatgpt_account_id": account_id }
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let client = OAuthClient::new(AuthConfig::default());
        let flow = AuthorizationFlowState::new(1455);

        let url = Url::parse(&client.authorize_url(&flow).expect("url")).expect("parse");
        let pairs: std::collections::BTreeMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], flow.state());
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:1455/auth/callback"
        );
        assert!(!pairs["code_challenge"].is_empty());
    }

    #[test]
    fn grant_without_access_token_is_malformed() {
        let wire = WireGrant {
            access_token: None,
            refresh_token: Some("rt".to_string()),
            expires_in: Some(3600),
        };
        assert!(matches!(
            TokenGrant::from_wire(wire),
            Err(AuthError::MalformedGrant("access_token"))
        ));
    }

    #[test]
    fn refresh_grant_keeps_the_previous_refresh_token() {
        let grant = TokenGrant {
            access_token: token_with_account_id("acct_9"),
            refresh_token: None,
            expires_in: 3600,
        };
        let credentials = grant
            .into_credentials(Some("rt-old".to_string()))
            .expect("credentials");

        assert_eq!(credentials.refresh_token.as_deref(), Some("rt-old"));
        assert_eq!(credentials.account_id.as_deref(), Some("acct_9"));
        assert!(credentials.expires_at_ms > now_ms());
    }

    #[test]
    fn token_without_identity_claim_is_rejected() {
        let grant = TokenGrant {
            access_token: "opaque-token".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };
        assert!(matches!(
            grant.into_credentials(None),
            Err(AuthError::MissingIdentity)
        ));
    }
}
