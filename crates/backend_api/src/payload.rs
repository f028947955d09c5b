use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical request payload for the responses endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Must be a JSON array of input items; validated before dispatch.
    pub input: Value,
    #[serde(default)]
    pub store: bool,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(default)]
    pub parallel_tool_calls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningParams>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

fn default_true() -> bool {
    true
}

impl BackendRequest {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        input: impl Into<Value>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            model: model.into(),
            instructions,
            input: input.into(),
            store: false,
            stream: true,
            include: vec!["reasoning.encrypted_content".to_string()],
            tool_choice: Some("auto".to_string()),
            parallel_tool_calls: true,
            prompt_cache_key: None,
            reasoning: None,
            tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning = Some(ReasoningParams {
            effort: Some(effort.into()),
            summary: Some("auto".to_string()),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
