//! Interactive coding-agent runtime.
//!
//! The orchestrator ([`agent::Agent`]) owns one conversation, drives each
//! turn through a pluggable [`Transport`](turn_protocol::transport::Transport)
//! and broadcasts canonical events to subscribers. The session layer
//! ([`session::Session`]) wraps it with a prompt queue, hook and
//! instrumentation sinks, deadlines, and scoped teardown. All failures
//! crossing the public surface are classified into
//! [`SdkError`](turn_protocol::error::SdkError).
//!
//! This crate is a library: it emits `tracing` events but never installs a
//! subscriber.

pub mod agent;
pub mod hooks;
pub mod queue;
pub mod session;

pub use agent::{Agent, StartTurnError, Subscription, TurnHandle, TurnReport};
pub use hooks::{HookMessage, HookModule, HookRegistry, InstrumentationEvent};
pub use queue::{DeliveryMode, PromptQueue, PromptQueueEntry};
pub use session::{ChatReply, Envelope, EventStream, Session, SessionConfig, SubmitOptions};

pub use backend_api::ApiConfig;
pub use backend_auth::{
    AuthConfig, CredentialManager, CredentialStore, Credentials, LoginHandle, OAuthClient,
};
pub use backend_transport::{
    classify_api_error, CredentialGatedTransport, DirectTransport, RelayConfig, RelayTransport,
    RouterTransport,
};

pub use turn_protocol::cancel::{new_cancel_signal, request_cancel, CancelSignal};
pub use turn_protocol::conversation::{Attachment, ConversationState, ConversationStatus};
pub use turn_protocol::cycling::{
    CycleDirection, CycleState, ModelCandidate, ModelSelection, ReasoningEffort,
};
pub use turn_protocol::error::{ErrorCode, SdkError, SdkResult};
pub use turn_protocol::events::{TurnEvent, TurnId, TurnStatus, TurnUsage};
