//! Wire client for the streaming responses backend.
//!
//! This crate owns request building, header construction, SSE parsing, and
//! retry behavior for one backend wire protocol only. It contains no
//! credential lifecycle code and no orchestration concerns; callers hand it
//! a bearer token and receive normalized wire events.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;

pub use client::{ApiClient, StreamEnd};
pub use config::{normalize_endpoint, ApiConfig, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use events::{WireEvent, WireStatus, WireUsage};
pub use headers::account_id_from_token;
pub use payload::{BackendRequest, ReasoningParams};
pub use sse::SseParser;
