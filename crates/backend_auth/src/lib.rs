//! Credential lifecycle for the token-gated backend.
//!
//! Covers the PKCE authorization flow, the single-use loopback callback
//! listener, code-for-token exchange, single-flighted refresh, and atomic
//! credential persistence. Account identity is decoded locally from the
//! access token; no verification round trip is made.

mod error;
mod listener;
mod manager;
mod oauth;
mod pkce;
mod store;

pub use error::AuthError;
pub use listener::CallbackListener;
pub use manager::{CredentialManager, LoginHandle, EXPIRY_SKEW};
pub use oauth::{AuthConfig, OAuthClient, TokenGrant};
pub use pkce::AuthorizationFlowState;
pub use store::{CredentialStore, Credentials};
