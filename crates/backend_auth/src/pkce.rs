//! Proof Key for Code Exchange material (RFC 7636, S256 only).

use std::time::Instant;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verifier/challenge pair for one authorization attempt.
#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; 64];
        rand::rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

fn state_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Everything one in-flight authorization attempt needs to be completed
/// and validated later. Dropped wholesale when a new attempt supersedes it.
#[derive(Debug, Clone)]
pub struct AuthorizationFlowState {
    pub(crate) state: String,
    pub(crate) pkce: PkcePair,
    pub(crate) redirect_port: u16,
    pub(crate) created_at: Instant,
}

impl AuthorizationFlowState {
    pub(crate) fn new(redirect_port: u16) -> Self {
        Self {
            state: state_nonce(),
            pkce: PkcePair::generate(),
            redirect_port,
            created_at: Instant::now(),
        }
    }

    /// Opaque anti-forgery nonce echoed back by the callback.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Loopback port the callback listener is bound to.
    #[must_use]
    pub fn redirect_port(&self) -> u16 {
        self.redirect_port
    }

    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use sha2::{Digest, Sha256};

    use super::{AuthorizationFlowState, PkcePair};

    #[test]
    fn challenge_is_the_s256_digest_of_the_verifier() {
        let pair = PkcePair::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.verifier.as_bytes()));
        assert_eq!(pair.challenge, expected);
    }

    #[test]
    fn verifier_is_url_safe_and_within_rfc_bounds() {
        let pair = PkcePair::generate();
        assert!(pair.verifier.len() >= 43 && pair.verifier.len() <= 128);
        assert!(pair
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn each_flow_gets_fresh_material() {
        let a = AuthorizationFlowState::new(1455);
        let b = AuthorizationFlowState::new(1455);
        assert_ne!(a.state(), b.state());
        assert_ne!(a.pkce.verifier, b.pkce.verifier);
    }
}
