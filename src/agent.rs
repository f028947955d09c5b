//! Agent orchestrator: owns one conversation, drives each turn through a
//! transport, and broadcasts events to subscribers.
//!
//! Terminal events are emitted here, never by transports, so every turn
//! ends with `TurnCompleted` (preceded by `TurnError` on failure) no matter
//! how the transport behaved.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use turn_protocol::cancel::{new_cancel_signal, request_cancel, CancelSignal};
use turn_protocol::conversation::{Attachment, ConversationState, ConversationStatus};
use turn_protocol::cycling::{CycleDirection, CycleState, ModelSelection};
use turn_protocol::error::SdkError;
use turn_protocol::events::{TurnEvent, TurnId, TurnStatus, TurnUsage};
use turn_protocol::transport::{Transport, TurnRequest};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event listener registered through [`Agent::subscribe`].
pub type Listener = Arc<dyn Fn(&TurnEvent) + Send + Sync>;

/// Typed condition for a rejected start; the session layer decides whether
/// to queue or surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTurnError {
    Busy,
}

impl fmt::Display for StartTurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("a turn is already active"),
        }
    }
}

impl std::error::Error for StartTurnError {}

/// How one turn ended, with everything the session layer needs to resolve
/// its waiter.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn_id: TurnId,
    pub status: TurnStatus,
    pub error: Option<SdkError>,
    pub usage: TurnUsage,
    /// Accumulated assistant text at turn end; partial when aborted.
    pub assistant_text: String,
}

/// Handle to an in-flight turn. Arming `cancel` aborts just this turn.
#[derive(Debug)]
pub struct TurnHandle {
    pub turn_id: TurnId,
    pub cancel: CancelSignal,
    done: oneshot::Receiver<TurnReport>,
}

impl TurnHandle {
    /// Wait for the turn's terminal report.
    pub async fn wait(self) -> TurnReport {
        match self.done.await {
            Ok(report) => report,
            Err(_) => TurnReport {
                turn_id: self.turn_id,
                status: TurnStatus::Errored,
                error: Some(SdkError::config("turn worker exited without reporting")),
                usage: TurnUsage::default(),
                assistant_text: String::new(),
            },
        }
    }
}

/// Unsubscribes its listener when dropped.
pub struct Subscription {
    agent: Weak<Agent>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(agent) = self.agent.upgrade() {
            lock_unpoisoned(&agent.subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancelSignal,
    task: JoinHandle<()>,
    terminal_emitted: Arc<AtomicBool>,
}

pub struct Agent {
    transport: Arc<dyn Transport>,
    instructions: Option<String>,
    state: Mutex<ConversationState>,
    cycle: Mutex<CycleState>,
    subscribers: Mutex<Vec<(u64, Listener)>>,
    next_subscriber_id: AtomicU64,
    next_turn_id: AtomicU64,
    active: Mutex<Option<ActiveTurn>>,
}

impl Agent {
    pub fn new(
        transport: Arc<dyn Transport>,
        cycle: CycleState,
        instructions: Option<String>,
    ) -> Arc<Self> {
        let state = ConversationState::new(cycle.selection());
        Arc::new(Self {
            transport,
            instructions,
            state: Mutex::new(state),
            cycle: Mutex::new(cycle),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            next_turn_id: AtomicU64::new(1),
            active: Mutex::new(None),
        })
    }

    /// Register a listener; every subsequent event reaches it in emission
    /// order until the returned [`Subscription`] is dropped.
    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.subscribers).push((id, listener));
        Subscription {
            agent: Arc::downgrade(self),
            id,
        }
    }

    /// Snapshot of the conversation transcript, status, selection, and
    /// usage totals.
    #[must_use]
    pub fn state_snapshot(&self) -> ConversationState {
        lock_unpoisoned(&self.state).clone()
    }

    #[must_use]
    pub fn selection(&self) -> ModelSelection {
        lock_unpoisoned(&self.state).selection.clone()
    }

    pub fn cycle_model(&self, direction: CycleDirection) -> ModelSelection {
        let selection = {
            let mut cycle = lock_unpoisoned(&self.cycle);
            *cycle = cycle.cycle_model(direction);
            cycle.selection()
        };
        lock_unpoisoned(&self.state).selection = selection.clone();
        selection
    }

    pub fn cycle_effort(&self, direction: CycleDirection) -> ModelSelection {
        let selection = {
            let mut cycle = lock_unpoisoned(&self.cycle);
            *cycle = cycle.cycle_effort(direction);
            cycle.selection()
        };
        lock_unpoisoned(&self.state).selection = selection.clone();
        selection
    }

    /// Start a turn when idle. While a turn is active the call is rejected
    /// with [`StartTurnError::Busy`].
    pub fn start_turn(
        self: &Arc<Self>,
        prompt: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<TurnHandle, StartTurnError> {
        let mut active = lock_unpoisoned(&self.active);
        if active.is_some() {
            return Err(StartTurnError::Busy);
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let cancel = new_cancel_signal();
        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();

        let request = {
            let mut state = lock_unpoisoned(&self.state);
            state.push_user(prompt, attachments);
            state.status = ConversationStatus::Running;
            TurnRequest {
                turn_id,
                entries: state.entries.clone(),
                instructions: self.instructions.clone(),
                selection: state.selection.clone(),
            }
        };

        debug!(turn_id, transport = self.transport.name(), "starting turn");
        let agent = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let worker_flag = terminal_emitted.clone();
        let task = tokio::spawn(async move {
            agent
                .run_worker(request, worker_cancel, worker_flag, done_tx)
                .await;
        });

        *active = Some(ActiveTurn {
            turn_id,
            cancel: cancel.clone(),
            task,
            terminal_emitted,
        });
        Ok(TurnHandle {
            turn_id,
            cancel,
            done: done_rx,
        })
    }

    /// Cancellation signal of the turn running right now, if any. The
    /// signal stays tied to that turn even after it finishes, so arming it
    /// later can never touch a successor turn.
    #[must_use]
    pub fn active_turn_cancel(&self) -> Option<CancelSignal> {
        lock_unpoisoned(&self.active)
            .as_ref()
            .map(|active| active.cancel.clone())
    }

    /// Cancel the active turn and wait for its task to finish, so every
    /// transport-held resource is released before returning. No-op when
    /// idle.
    pub async fn abort(&self) {
        let Some(active) = lock_unpoisoned(&self.active).take() else {
            return;
        };
        let ActiveTurn {
            turn_id,
            cancel,
            task,
            terminal_emitted,
        } = active;

        debug!(turn_id, "aborting active turn");
        request_cancel(&cancel);
        let joined = task.await;

        // Watchdog: the worker emits terminal events on every normal path,
        // so reaching here without them means it panicked or was torn down.
        if joined.is_err() || !terminal_emitted.load(Ordering::SeqCst) {
            warn!(turn_id, "turn ended without a terminal event, failing it explicitly");
            lock_unpoisoned(&self.state).status = ConversationStatus::Errored;
            self.emit(&TurnEvent::TurnError {
                turn_id,
                error: SdkError::config("turn worker exited without a terminal event"),
            });
            self.emit(&TurnEvent::TurnCompleted {
                turn_id,
                status: TurnStatus::Errored,
                usage: TurnUsage::default(),
            });
        }
    }

    async fn run_worker(
        self: Arc<Self>,
        request: TurnRequest,
        cancel: CancelSignal,
        terminal_emitted: Arc<AtomicBool>,
        done: oneshot::Sender<TurnReport>,
    ) {
        let turn_id = request.turn_id;
        let result = {
            let agent = &self;
            let mut sink = move |event: TurnEvent| agent.absorb_streaming_event(event);
            self.transport.run(request, cancel, &mut sink).await
        };

        let report = match result {
            Ok(outcome) => self.finish_turn(turn_id, TurnStatus::Completed, None, outcome.usage),
            Err(error) if error.is_cancellation() => {
                self.finish_turn(turn_id, TurnStatus::Aborted, Some(error), TurnUsage::default())
            }
            Err(error) => {
                self.finish_turn(turn_id, TurnStatus::Errored, Some(error), TurnUsage::default())
            }
        };

        terminal_emitted.store(true, Ordering::SeqCst);
        let _ = done.send(report);
    }

    fn absorb_streaming_event(&self, event: TurnEvent) {
        {
            let mut state = lock_unpoisoned(&self.state);
            match &event {
                TurnEvent::TextDelta { text, .. } => state.append_assistant_text(text),
                TurnEvent::ToolExecutionStart {
                    call_id, tool_name, ..
                } => state.push_tool_call(call_id.clone(), tool_name.clone(), Value::Null),
                TurnEvent::ToolExecutionEnd {
                    call_id,
                    tool_name,
                    is_error,
                    ..
                } => {
                    state.push_tool_result(call_id.clone(), tool_name.clone(), Value::Null, *is_error);
                }
                _ => {}
            }
        }
        self.emit(&event);
    }

    fn finish_turn(
        &self,
        turn_id: TurnId,
        status: TurnStatus,
        error: Option<SdkError>,
        usage: TurnUsage,
    ) -> TurnReport {
        let assistant_text = {
            let mut state = lock_unpoisoned(&self.state);
            state.status = match status {
                TurnStatus::Completed => ConversationStatus::Idle,
                TurnStatus::Aborted => ConversationStatus::Aborted,
                TurnStatus::Errored => ConversationStatus::Errored,
            };
            state.usage.absorb(usage);
            state.last_assistant_text().unwrap_or_default().to_string()
        };

        if let Some(error) = &error {
            self.emit(&TurnEvent::TurnError {
                turn_id,
                error: error.clone(),
            });
        }
        self.emit(&TurnEvent::TurnCompleted {
            turn_id,
            status,
            usage,
        });

        // Clear the slot before resolving waiters so a follow-up start
        // never observes a stale Busy.
        let mut active = lock_unpoisoned(&self.active);
        if active.as_ref().is_some_and(|current| current.turn_id == turn_id) {
            *active = None;
        }
        drop(active);

        TurnReport {
            turn_id,
            status,
            error,
            usage,
            assistant_text,
        }
    }

    /// Dispatch one event to a snapshot of the listener list, so listeners
    /// (un)subscribing mid-dispatch cannot corrupt the pass.
    fn emit(&self, event: &TurnEvent) {
        let listeners: Vec<Listener> = lock_unpoisoned(&self.subscribers)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
