//! Direct streaming transport: one backend call per turn.

use async_trait::async_trait;
use serde_json::{json, Value};

use backend_api::{ApiClient, ApiConfig, ApiError, BackendRequest, WireEvent};
use turn_protocol::cancel::CancelSignal;
use turn_protocol::conversation::TurnEntry;
use turn_protocol::error::SdkResult;
use turn_protocol::events::{TurnEvent, TurnId, TurnUsage};
use turn_protocol::transport::{EventSink, Transport, TurnOutcome, TurnRequest};

use crate::classify::classify_api_error;

/// Serialize the transcript into backend input items, oldest first.
pub(crate) fn input_items(entries: &[TurnEntry]) -> Value {
    let items: Vec<Value> = entries
        .iter()
        .map(|entry| match entry {
            TurnEntry::User { text, attachments } => {
                let mut content = vec![json!({"type": "input_text", "text": text})];
                for attachment in attachments {
                    content.push(json!({
                        "type": "input_image",
                        "image_url": format!(
                            "data:{};base64,{}",
                            attachment.media_type, attachment.data
                        ),
                    }));
                }
                json!({"type": "message", "role": "user", "content": content})
            }
            TurnEntry::Assistant { text } => json!({
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}],
            }),
            TurnEntry::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": tool_name,
                "arguments": arguments.to_string(),
            }),
            TurnEntry::ToolResult {
                call_id, content, ..
            } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": content.to_string(),
            }),
        })
        .collect();
    Value::Array(items)
}

pub(crate) fn backend_request(request: &TurnRequest) -> BackendRequest {
    BackendRequest::new(
        request.selection.model_id.clone(),
        input_items(&request.entries),
        request.instructions.clone(),
    )
    .with_reasoning_effort(request.selection.effort.as_str())
}

/// Map one wire frame onto the canonical event it announces, if any.
/// Terminal frames produce nothing here; completion is reported through
/// the stream end and failures through the error path.
pub(crate) fn canonical_event(turn_id: TurnId, wire: WireEvent) -> Option<TurnEvent> {
    match wire {
        WireEvent::OutputTextDelta { delta } => Some(TurnEvent::TextDelta {
            turn_id,
            text: delta,
        }),
        WireEvent::ReasoningTextDelta { delta } => Some(TurnEvent::ThinkingDelta {
            turn_id,
            text: delta,
        }),
        WireEvent::ToolCallStarted {
            call_id, tool_name, ..
        } => Some(TurnEvent::ToolExecutionStart {
            turn_id,
            call_id,
            tool_name,
        }),
        WireEvent::ToolCallFinished {
            call_id,
            tool_name,
            is_error,
        } => Some(TurnEvent::ToolExecutionEnd {
            turn_id,
            call_id,
            tool_name,
            is_error,
        }),
        WireEvent::Completed { .. } | WireEvent::Failed { .. } | WireEvent::Error { .. } => None,
    }
}

/// Run one streaming turn through an already-configured client.
pub(crate) async fn run_turn(
    client: &ApiClient,
    request: &TurnRequest,
    cancel: &CancelSignal,
    sink: EventSink<'_>,
) -> Result<TurnOutcome, ApiError> {
    let payload = backend_request(request);
    let turn_id = request.turn_id;

    let end = client
        .stream_with_handler(&payload, cancel, |wire| {
            if let Some(event) = canonical_event(turn_id, wire) {
                sink(event);
            }
        })
        .await?;

    Ok(TurnOutcome {
        usage: TurnUsage {
            input_tokens: end.usage.input_tokens,
            output_tokens: end.usage.output_tokens,
            cost: 0.0,
        },
    })
}

/// Transport issuing one streaming call per turn with a fixed token.
pub struct DirectTransport {
    client: ApiClient,
}

impl DirectTransport {
    pub fn new(config: ApiConfig) -> SdkResult<Self> {
        let client = ApiClient::new(config).map_err(classify_api_error)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &str {
        "direct"
    }

    async fn run(
        &self,
        request: TurnRequest,
        cancel: CancelSignal,
        sink: EventSink<'_>,
    ) -> SdkResult<TurnOutcome> {
        run_turn(&self.client, &request, &cancel, sink)
            .await
            .map_err(classify_api_error)
    }
}
