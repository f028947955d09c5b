//! Shared contract types for the agent runtime.
//!
//! This crate intentionally defines only the canonical turn lifecycle, the
//! closed error taxonomy, conversation state, model/effort cycling, and the
//! transport capability trait. It excludes backend wire protocols, credential
//! handling, and multi-turn orchestration concerns.

pub mod cancel;
pub mod conversation;
pub mod cycling;
pub mod error;
pub mod events;
pub mod transport;

pub use cancel::{await_or_cancel, is_cancelled, new_cancel_signal, request_cancel, CancelSignal};
pub use conversation::{Attachment, ConversationState, ConversationStatus, TurnEntry, UsageTotals};
pub use cycling::{CycleDirection, CycleState, ModelCandidate, ModelSelection, ReasoningEffort};
pub use error::{ErrorCode, SdkError, SdkResult};
pub use events::{TurnEvent, TurnId, TurnStatus, TurnUsage};
pub use transport::{EventSink, Transport, TurnOutcome, TurnRequest};
