//! Conversation state owned by the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cycling::ModelSelection;
use crate::events::TurnUsage;

/// Inline attachment carried with a user prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    /// Base64 payload; the runtime never inspects it.
    pub data: String,
}

/// One entry in the ordered conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnEntry {
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },
    Assistant {
        text: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: Value,
        is_error: bool,
    },
}

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Idle,
    Running,
    Aborted,
    Errored,
}

/// Running token/cost totals across turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl UsageTotals {
    pub fn absorb(&mut self, usage: TurnUsage) {
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        self.cost += usage.cost;
    }
}

/// Ordered transcript plus status, selection, and usage totals.
///
/// Mutated only by the orchestrator while a turn is active; everyone else
/// reads cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub entries: Vec<TurnEntry>,
    pub status: ConversationStatus,
    pub selection: ModelSelection,
    pub usage: UsageTotals,
}

impl ConversationState {
    #[must_use]
    pub fn new(selection: ModelSelection) -> Self {
        Self {
            entries: Vec::new(),
            status: ConversationStatus::Idle,
            selection,
            usage: UsageTotals::default(),
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>, attachments: Vec<Attachment>) {
        self.entries.push(TurnEntry::User {
            text: text.into(),
            attachments,
        });
    }

    /// Appends streamed text to the trailing assistant entry, starting one
    /// when the transcript does not end with an assistant entry.
    pub fn append_assistant_text(&mut self, text: &str) {
        if let Some(TurnEntry::Assistant { text: existing }) = self.entries.last_mut() {
            existing.push_str(text);
            return;
        }

        self.entries.push(TurnEntry::Assistant {
            text: text.to_string(),
        });
    }

    pub fn push_tool_call(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) {
        self.entries.push(TurnEntry::ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        });
    }

    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Value,
        is_error: bool,
    ) {
        self.entries.push(TurnEntry::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content,
            is_error,
        });
    }

    /// Returns the text of the trailing assistant entry, if any.
    #[must_use]
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|entry| match entry {
            TurnEntry::Assistant { text } => Some(text.as_str()),
            _ => None,
        })
    }
}
