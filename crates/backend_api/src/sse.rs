use serde_json::Value;

use crate::events::{WireEvent, WireStatus, WireUsage};

/// Incremental parser for the backend's SSE stream.
///
/// Frames may arrive split across arbitrary byte boundaries; `feed` buffers
/// partial frames and drains only complete ones. `[DONE]` markers, blank
/// payloads, and unknown event types are tolerated and dropped.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<WireEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" || payload.is_empty() {
                continue;
            }

            if let Ok(value) = serde_json::from_str::<Value>(&payload) {
                if let Some(event) = map_event(&value) {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    #[must_use]
    pub fn parse_frames(input: &str) -> Vec<WireEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    #[must_use]
    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: &Value) -> Option<WireEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "response.output_text.delta" => Some(WireEvent::OutputTextDelta {
            delta: str_field(value, "delta").unwrap_or_default(),
        }),
        "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
            Some(WireEvent::ReasoningTextDelta {
                delta: str_field(value, "delta").unwrap_or_default(),
            })
        }
        "response.output_item.added" => map_tool_call_started(value.get("item")?),
        "response.output_item.done" => map_tool_call_finished(value.get("item")?),
        "response.completed" | "response.done" => {
            let response = value.get("response");
            let status = response
                .and_then(|response| response.get("status"))
                .and_then(Value::as_str)
                .and_then(WireStatus::parse)
                .unwrap_or(WireStatus::Completed);
            let usage = response
                .and_then(|response| response.get("usage"))
                .map(parse_usage)
                .unwrap_or_default();

            // Alias handling stays explicit so callers receive one
            // normalized completion shape.
            Some(WireEvent::Completed { status, usage })
        }
        "response.failed" => {
            let message = value
                .get("response")
                .and_then(|response| response.get("error"))
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            Some(WireEvent::Failed { message })
        }
        "error" => Some(WireEvent::Error {
            code: str_field(value, "code"),
            message: str_field(value, "message"),
        }),
        _ => None,
    }
}

fn map_tool_call_started(item: &Value) -> Option<WireEvent> {
    if item.get("type")?.as_str()? != "function_call" {
        return None;
    }

    let arguments = item.get("arguments").and_then(|arguments| match arguments {
        Value::String(raw) => serde_json::from_str::<Value>(raw).ok(),
        other => Some(other.clone()),
    });

    Some(WireEvent::ToolCallStarted {
        call_id: call_id_of(item)?,
        tool_name: str_field(item, "name")?,
        arguments,
    })
}

fn map_tool_call_finished(item: &Value) -> Option<WireEvent> {
    if item.get("type")?.as_str()? != "function_call" {
        return None;
    }

    let is_error = item
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| status == "failed");

    Some(WireEvent::ToolCallFinished {
        call_id: call_id_of(item)?,
        tool_name: str_field(item, "name")?,
        is_error,
    })
}

fn call_id_of(item: &Value) -> Option<String> {
    str_field(item, "call_id").or_else(|| str_field(item, "id"))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn parse_usage(usage: &Value) -> WireUsage {
    WireUsage {
        input_tokens: usage
            .get("input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: usage
            .get("output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::SseParser;
    use crate::events::{WireEvent, WireStatus};

    #[test]
    fn frames_split_across_feeds_are_reassembled() {
        let mut parser = SseParser::default();

        let first = parser.feed(b"data: {\"type\":\"response.output_text.delta\",\"de");
        assert!(first.is_empty());

        let second = parser.feed(b"lta\":\"Hello\"}\n\n");
        assert_eq!(
            second,
            vec![WireEvent::OutputTextDelta {
                delta: "Hello".to_string(),
            }]
        );
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn done_markers_and_unknown_types_are_dropped() {
        let frames = concat!(
            "data: [DONE]\n\n",
            "data: {\"type\":\"response.audio.delta\",\"delta\":\"x\"}\n\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"y\"}\n\n",
        );
        let events = SseParser::parse_frames(frames);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn completion_frames_carry_status_and_usage() {
        let frames = "data: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\",\"usage\":{\"input_tokens\":42,\"output_tokens\":7}}}\n\n";
        let events = SseParser::parse_frames(frames);

        match &events[0] {
            WireEvent::Completed { status, usage } => {
                assert_eq!(*status, WireStatus::Completed);
                assert_eq!(usage.input_tokens, 42);
                assert_eq!(usage.output_tokens, 7);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn function_call_items_map_to_tool_lifecycle_events() {
        let frames = concat!(
            "data: {\"type\":\"response.output_item.added\",\"item\":{\"type\":\"function_call\",\"call_id\":\"call-1\",\"name\":\"read\",\"arguments\":\"{\\\"path\\\":\\\"a.txt\\\"}\"}}\n\n",
            "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"function_call\",\"call_id\":\"call-1\",\"name\":\"read\",\"status\":\"completed\"}}\n\n",
        );
        let events = SseParser::parse_frames(frames);

        assert_eq!(events.len(), 2);
        match &events[0] {
            WireEvent::ToolCallStarted {
                call_id,
                tool_name,
                arguments,
            } => {
                assert_eq!(call_id, "call-1");
                assert_eq!(tool_name, "read");
                assert_eq!(
                    arguments.as_ref().and_then(|value| value["path"].as_str()),
                    Some("a.txt")
                );
            }
            other => panic!("expected tool start, got {other:?}"),
        }
        assert!(matches!(
            &events[1],
            WireEvent::ToolCallFinished { is_error: false, .. }
        ));
    }

    #[test]
    fn non_function_output_items_are_ignored() {
        let frames = "data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"message\",\"id\":\"msg-1\"}}\n\n";
        assert!(SseParser::parse_frames(frames).is_empty());
    }
}
