//! Credential lifecycle: cached access, single-flighted refresh, and the
//! interactive login flow.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use turn_protocol::cancel::{new_cancel_signal, request_cancel, CancelSignal};

use crate::error::AuthError;
use crate::listener::CallbackListener;
use crate::oauth::OAuthClient;
use crate::pkce::AuthorizationFlowState;
use crate::store::{CredentialStore, Credentials};

/// Tokens within this much of expiry are refreshed before use.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(60);

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An authorization flow that has been started but not yet completed.
/// Holds the bound listener; dropping the handle releases the port.
pub struct LoginHandle {
    authorize_url: String,
    flow: AuthorizationFlowState,
    listener: CallbackListener,
    cancel: CancelSignal,
}

impl LoginHandle {
    /// URL the user opens in a browser.
    #[must_use]
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    #[must_use]
    pub fn redirect_port(&self) -> u16 {
        self.listener.port()
    }
}

pub struct CredentialManager {
    store: CredentialStore,
    oauth: OAuthClient,
    cached: tokio::sync::Mutex<Option<Credentials>>,
    // Serializes refresh attempts so concurrent expired callers produce a
    // single token-endpoint request.
    refresh_gate: tokio::sync::Mutex<()>,
    pending_login: Mutex<Option<CancelSignal>>,
}

impl CredentialManager {
    #[must_use]
    pub fn new(store: CredentialStore, oauth: OAuthClient) -> Self {
        Self {
            store,
            oauth,
            cached: tokio::sync::Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            pending_login: Mutex::new(None),
        }
    }

    /// Usable credentials, refreshing first when the access token is within
    /// [`EXPIRY_SKEW`] of expiry.
    pub async fn fresh_credentials(&self, cancel: &CancelSignal) -> Result<Credentials, AuthError> {
        let stale_access_token = {
            let mut cached = self.cached.lock().await;
            if cached.is_none() {
                *cached = self.store.load()?;
            }
            let current = cached.as_ref().ok_or(AuthError::NotAuthenticated)?;
            if !current.is_expiring(EXPIRY_SKEW) {
                return Ok(current.clone());
            }
            current.access_token.clone()
        };

        self.refreshed_after(&stale_access_token, cancel).await
    }

    /// Refresh, but only if `stale_access_token` is still the cached token.
    /// Callers that hit a 401 pass the token they used; whichever of them
    /// reaches the gate first performs the one real refresh and the rest
    /// pick up its result.
    pub async fn refreshed_after(
        &self,
        stale_access_token: &str,
        cancel: &CancelSignal,
    ) -> Result<Credentials, AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let mut cached = self.cached.lock().await;
            if cached.is_none() {
                *cached = self.store.load()?;
            }
            let current = cached.as_ref().ok_or(AuthError::NotAuthenticated)?;
            if current.access_token != stale_access_token {
                debug!("token already rotated by an earlier caller");
                return Ok(current.clone());
            }
            current
                .refresh_token
                .clone()
                .ok_or(AuthError::NotAuthenticated)?
        };

        let grant = self.oauth.refresh(&refresh_token, cancel).await?;
        let credentials = grant.into_credentials(Some(refresh_token))?;
        self.store.save(&credentials)?;
        *self.cached.lock().await = Some(credentials.clone());
        info!("access token refreshed");
        Ok(credentials)
    }

    /// Begin an authorization flow. Any earlier pending flow is cancelled
    /// before the new port is bound; only the newest flow can complete.
    pub async fn begin_login(&self) -> Result<LoginHandle, AuthError> {
        if let Some(previous) = lock_unpoisoned(&self.pending_login).take() {
            debug!("superseding an earlier pending login flow");
            request_cancel(&previous);
        }

        let listener = CallbackListener::bind().await?;
        let flow = AuthorizationFlowState::new(listener.port());
        let authorize_url = self.oauth.authorize_url(&flow)?;
        let cancel = new_cancel_signal();
        *lock_unpoisoned(&self.pending_login) = Some(cancel.clone());

        Ok(LoginHandle {
            authorize_url,
            flow,
            listener,
            cancel,
        })
    }

    /// Wait for the browser callback, exchange the code, and persist the
    /// resulting credentials.
    pub async fn complete_login(
        &self,
        handle: LoginHandle,
        window: Duration,
    ) -> Result<Credentials, AuthError> {
        let LoginHandle {
            flow,
            listener,
            cancel,
            ..
        } = handle;

        let outcome = async {
            let code = listener.wait_for_code(flow.state(), window, &cancel).await?;
            let grant = self.oauth.exchange_code(&code, &flow, &cancel).await?;
            grant.into_credentials(None)
        }
        .await;

        {
            let mut pending = lock_unpoisoned(&self.pending_login);
            if pending
                .as_ref()
                .is_some_and(|active| CancelSignal::ptr_eq(active, &cancel))
            {
                *pending = None;
            }
        }

        let credentials = outcome?;
        self.store.save(&credentials)?;
        *self.cached.lock().await = Some(credentials.clone());
        info!(account_id = ?credentials.account_id, "login complete");
        Ok(credentials)
    }

    /// Drop stored and cached credentials and cancel any pending flow.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Some(pending) = lock_unpoisoned(&self.pending_login).take() {
            request_cancel(&pending);
        }
        self.store.clear()?;
        *self.cached.lock().await = None;
        info!("logged out");
        Ok(())
    }
}
