//! Transport capability contract.
//!
//! A transport maps one backend's wire protocol onto the canonical streaming
//! event set for a single turn. Terminal events (`TurnError`,
//! `TurnCompleted`) are emitted by the orchestrator, never by transports, so
//! a turn cannot end without them regardless of transport behavior.

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::conversation::TurnEntry;
use crate::cycling::ModelSelection;
use crate::error::SdkResult;
use crate::events::{TurnEvent, TurnId, TurnUsage};

/// Everything a transport needs to execute one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    /// Full model-facing transcript, oldest first.
    pub entries: Vec<TurnEntry>,
    pub instructions: Option<String>,
    pub selection: ModelSelection,
}

/// What a successfully finished transport call reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOutcome {
    pub usage: TurnUsage,
}

/// Sink for streaming events produced while a turn runs.
pub type EventSink<'a> = &'a mut (dyn FnMut(TurnEvent) + Send);

/// Pluggable strategy producing a canonical event stream from one backend.
///
/// Implementations must observe `cancel` at the granularity of one in-flight
/// request and emit events in backend order.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stable identifier used in diagnostics and failover logs.
    fn name(&self) -> &str;

    /// Executes one turn, emitting streaming events into `sink`.
    async fn run(
        &self,
        request: TurnRequest,
        cancel: CancelSignal,
        sink: EventSink<'_>,
    ) -> SdkResult<TurnOutcome>;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{EventSink, Transport, TurnOutcome, TurnRequest};
    use crate::cancel::{new_cancel_signal, CancelSignal};
    use crate::cycling::{ModelSelection, ReasoningEffort};
    use crate::error::SdkResult;
    use crate::events::{TurnEvent, TurnUsage};

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(
            &self,
            request: TurnRequest,
            _cancel: CancelSignal,
            sink: EventSink<'_>,
        ) -> SdkResult<TurnOutcome> {
            sink(TurnEvent::TextDelta {
                turn_id: request.turn_id,
                text: "ok".to_string(),
            });
            Ok(TurnOutcome {
                usage: TurnUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                    cost: 0.0,
                },
            })
        }
    }

    #[tokio::test]
    async fn transports_emit_streaming_events_and_report_usage() {
        let request = TurnRequest {
            turn_id: 5,
            entries: Vec::new(),
            instructions: None,
            selection: ModelSelection {
                provider_id: "echo".to_string(),
                model_id: "echo-1".to_string(),
                effort: ReasoningEffort::Low,
            },
        };

        let mut events = Vec::new();
        let outcome = EchoTransport
            .run(request, new_cancel_signal(), &mut |event| {
                events.push(event);
            })
            .await
            .expect("echo transport should succeed");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].turn_id(), 5);
        assert_eq!(outcome.usage.output_tokens, 1);
    }
}
