//! Ordered failover across transports with buffer-then-commit delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use turn_protocol::cancel::CancelSignal;
use turn_protocol::error::{SdkError, SdkResult};
use turn_protocol::transport::{EventSink, Transport, TurnOutcome, TurnRequest};

/// Routes each turn through an ordered candidate list.
///
/// A candidate's events are buffered and forwarded only once it succeeds,
/// so a subscriber never sees partial output from a transport that later
/// failed. Retryable failures advance to the next candidate; non-retryable
/// failures and cancellation surface immediately.
pub struct RouterTransport {
    candidates: Vec<Arc<dyn Transport>>,
}

impl RouterTransport {
    pub fn new(candidates: Vec<Arc<dyn Transport>>) -> SdkResult<Self> {
        if candidates.is_empty() {
            return Err(SdkError::config("router requires at least one transport"));
        }
        Ok(Self { candidates })
    }
}

#[async_trait]
impl Transport for RouterTransport {
    fn name(&self) -> &str {
        "router"
    }

    async fn run(
        &self,
        request: TurnRequest,
        cancel: CancelSignal,
        sink: EventSink<'_>,
    ) -> SdkResult<TurnOutcome> {
        let mut last_error: Option<SdkError> = None;
        let total = self.candidates.len();

        for (index, candidate) in self.candidates.iter().enumerate() {
            let mut buffered = Vec::new();
            let outcome = candidate
                .run(request.clone(), cancel.clone(), &mut |event| {
                    buffered.push(event);
                })
                .await;

            match outcome {
                Ok(outcome) => {
                    for event in buffered {
                        sink(event);
                    }
                    return Ok(outcome);
                }
                Err(error) if error.is_cancellation() => return Err(error),
                Err(error) if error.retryable() && index + 1 < total => {
                    warn!(
                        candidate = candidate.name(),
                        error = %error,
                        "transport failed, trying the next candidate"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| SdkError::config("router requires at least one transport")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use turn_protocol::cancel::{new_cancel_signal, CancelSignal};
    use turn_protocol::cycling::{ModelSelection, ReasoningEffort};
    use turn_protocol::error::{ErrorCode, SdkError, SdkResult};
    use turn_protocol::events::{TurnEvent, TurnUsage};
    use turn_protocol::transport::{EventSink, Transport, TurnOutcome, TurnRequest};

    use super::RouterTransport;

    /// Emits scripted deltas, then resolves with the scripted outcome.
    struct ScriptedTransport {
        name: &'static str,
        deltas: Vec<&'static str>,
        outcome: Result<TurnUsage, SdkError>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(
            name: &'static str,
            deltas: Vec<&'static str>,
            outcome: Result<TurnUsage, SdkError>,
        ) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let transport = Arc::new(Self {
                name,
                deltas,
                outcome,
                calls: calls.clone(),
            });
            (transport, calls)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(
            &self,
            request: TurnRequest,
            _cancel: CancelSignal,
            sink: EventSink<'_>,
        ) -> SdkResult<TurnOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for delta in &self.deltas {
                sink(TurnEvent::TextDelta {
                    turn_id: request.turn_id,
                    text: (*delta).to_string(),
                });
            }
            match &self.outcome {
                Ok(usage) => Ok(TurnOutcome { usage: *usage }),
                Err(error) => Err(error.clone()),
            }
        }
    }

    fn request() -> TurnRequest {
        TurnRequest {
            turn_id: 9,
            entries: Vec::new(),
            instructions: None,
            selection: ModelSelection {
                provider_id: "scripted".to_string(),
                model_id: "model-a".to_string(),
                effort: ReasoningEffort::Medium,
            },
        }
    }

    fn collect_text(events: &[TurnEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::TextDelta { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn failed_primary_output_is_never_forwarded() {
        let (primary, primary_calls) = ScriptedTransport::new(
            "primary",
            vec!["partial ", "output"],
            Err(SdkError::network("connection reset")),
        );
        let (secondary, _) = ScriptedTransport::new(
            "secondary",
            vec!["clean answer"],
            Ok(TurnUsage {
                input_tokens: 10,
                output_tokens: 3,
                cost: 0.0,
            }),
        );
        let router = RouterTransport::new(vec![primary, secondary]).expect("router");

        let mut events = Vec::new();
        let outcome = router
            .run(request(), new_cancel_signal(), &mut |event| {
                events.push(event);
            })
            .await
            .expect("secondary succeeds");

        assert_eq!(collect_text(&events), vec!["clean answer"]);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.usage.output_tokens, 3);
    }

    #[tokio::test]
    async fn non_retryable_failures_do_not_fail_over() {
        let (primary, _) = ScriptedTransport::new(
            "primary",
            vec![],
            Err(SdkError::invalid_request("malformed input")),
        );
        let (secondary, secondary_calls) = ScriptedTransport::new(
            "secondary",
            vec!["unreached"],
            Ok(TurnUsage::default()),
        );
        let router = RouterTransport::new(vec![primary, secondary]).expect("router");

        let error = router
            .run(request(), new_cancel_signal(), &mut |_| {})
            .await
            .expect_err("must surface immediately");

        assert_eq!(error.code(), ErrorCode::InvalidRequest);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_surfaces_without_trying_other_candidates() {
        let (primary, _) =
            ScriptedTransport::new("primary", vec![], Err(SdkError::cancelled()));
        let (secondary, secondary_calls) =
            ScriptedTransport::new("secondary", vec![], Ok(TurnUsage::default()));
        let router = RouterTransport::new(vec![primary, secondary]).expect("router");

        let error = router
            .run(request(), new_cancel_signal(), &mut |_| {})
            .await
            .expect_err("cancelled");

        assert!(error.is_cancellation());
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_reports_the_last_candidate_error() {
        let (primary, _) = ScriptedTransport::new(
            "primary",
            vec![],
            Err(SdkError::network("primary down")),
        );
        let (secondary, _) = ScriptedTransport::new(
            "secondary",
            vec![],
            Err(SdkError::server_error("secondary 503")),
        );
        let router = RouterTransport::new(vec![primary, secondary]).expect("router");

        let error = router
            .run(request(), new_cancel_signal(), &mut |_| {})
            .await
            .expect_err("all candidates failed");

        assert_eq!(error.code(), ErrorCode::ServerError);
        assert!(error.message().contains("secondary 503"));
    }

    #[tokio::test]
    async fn empty_candidate_lists_are_rejected_at_construction() {
        assert!(RouterTransport::new(Vec::new()).is_err());
    }
}
