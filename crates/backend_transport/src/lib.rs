//! Concrete [`Transport`](turn_protocol::transport::Transport)
//! implementations over the streaming backend, plus the single place where
//! wire and credential errors are classified into the boundary taxonomy.

mod classify;
mod direct;
mod gated;
mod relay;
mod router;

pub use classify::classify_api_error;
pub use direct::DirectTransport;
pub use gated::CredentialGatedTransport;
pub use relay::{RelayConfig, RelayTransport};
pub use router::RouterTransport;
