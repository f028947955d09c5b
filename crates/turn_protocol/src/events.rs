//! Canonical turn lifecycle events.

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Identifier for one conversation turn.
pub type TurnId = u64;

/// Terminal disposition of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Aborted,
    Errored,
}

/// Token/cost accounting for a single turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost: f64,
}

/// Canonical event emitted while a turn runs.
///
/// Events are ordered and emitted at most once per logical occurrence.
/// `TurnCompleted` is always the final event of a turn; a failed turn emits
/// `TurnError` immediately before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TextDelta {
        turn_id: TurnId,
        text: String,
    },
    ThinkingDelta {
        turn_id: TurnId,
        text: String,
    },
    ToolExecutionStart {
        turn_id: TurnId,
        call_id: String,
        tool_name: String,
    },
    ToolExecutionEnd {
        turn_id: TurnId,
        call_id: String,
        tool_name: String,
        is_error: bool,
    },
    TurnError {
        turn_id: TurnId,
        error: SdkError,
    },
    TurnCompleted {
        turn_id: TurnId,
        status: TurnStatus,
        usage: TurnUsage,
    },
}

impl TurnEvent {
    /// Returns the turn this event belongs to.
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::TextDelta { turn_id, .. }
            | Self::ThinkingDelta { turn_id, .. }
            | Self::ToolExecutionStart { turn_id, .. }
            | Self::ToolExecutionEnd { turn_id, .. }
            | Self::TurnError { turn_id, .. }
            | Self::TurnCompleted { turn_id, .. } => *turn_id,
        }
    }

    /// Returns true for the event that closes a turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnCompleted { .. })
    }
}
