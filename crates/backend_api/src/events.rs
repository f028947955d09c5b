use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal state reported by the backend for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Completed,
    Incomplete,
    Failed,
    Cancelled,
    Queued,
    InProgress,
}

impl WireStatus {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
        }
    }
}

/// Token accounting parsed from the completion frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Normalized wire event produced by the SSE parser.
///
/// Unknown frame types are dropped during parsing so protocol additions do
/// not break existing consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    OutputTextDelta {
        delta: String,
    },
    ReasoningTextDelta {
        delta: String,
    },
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        arguments: Option<Value>,
    },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        is_error: bool,
    },
    Completed {
        status: WireStatus,
        usage: WireUsage,
    },
    Failed {
        message: Option<String>,
    },
    Error {
        code: Option<String>,
        message: Option<String>,
    },
}
