//! Session runtime: prompt queue, envelope streams, hook and
//! instrumentation sinks, deadlines, and scoped teardown around one
//! [`Agent`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use turn_protocol::cancel::request_cancel;
use turn_protocol::conversation::Attachment;
use turn_protocol::cycling::{CycleState, ModelCandidate};
use turn_protocol::error::{SdkError, SdkResult};
use turn_protocol::events::{TurnEvent, TurnStatus, TurnUsage};
use turn_protocol::transport::Transport;

use crate::agent::{Agent, StartTurnError, Subscription};
use crate::hooks::{
    HookMessage, HookModule, HookRegistry, InstrumentationCallback, InstrumentationEvent,
};
use crate::queue::{DeliveryMode, PromptQueue, PromptQueueEntry};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tagged item in a session's event stream.
#[derive(Debug, Clone)]
pub enum Envelope {
    Agent(TurnEvent),
    Hook(HookMessage),
    Instrumentation(InstrumentationEvent),
    /// Final item of every stream; a stream never ends silently.
    Closed,
}

/// Everything needed to build a session.
pub struct SessionConfig {
    pub transport: Arc<dyn Transport>,
    pub candidates: Vec<ModelCandidate>,
    pub instructions: Option<String>,
    pub hooks: Vec<HookModule>,
    pub instrumentation: Option<InstrumentationCallback>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, candidates: Vec<ModelCandidate>) -> Self {
        Self {
            transport,
            candidates,
            instructions: None,
            hooks: Vec::new(),
            instrumentation: None,
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<HookModule>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_instrumentation(mut self, callback: InstrumentationCallback) -> Self {
        self.instrumentation = Some(callback);
        self
    }
}

/// Per-submission options.
#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub mode: DeliveryMode,
    pub attachments: Vec<Attachment>,
    /// Arms the turn's cancellation signal when it elapses, so a deadline
    /// and an explicit abort classify identically.
    pub deadline: Option<Duration>,
}

/// What a completed submission returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub usage: TurnUsage,
}

/// Lazy, pull-consumed envelope sequence. Ends with [`Envelope::Closed`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

struct SessionInner {
    agent: Arc<Agent>,
    queue: Mutex<PromptQueue>,
    waiters: Mutex<HashMap<u64, oneshot::Sender<SdkResult<ChatReply>>>>,
    deadlines: Mutex<HashMap<u64, Duration>>,
    sinks: Mutex<Vec<mpsc::UnboundedSender<Envelope>>>,
    hooks: HookRegistry,
    instrumentation: Option<InstrumentationCallback>,
    notify: Notify,
    closed: AtomicBool,
}

impl SessionInner {
    fn broadcast(&self, envelope: Envelope) {
        let mut sinks = lock_unpoisoned(&self.sinks);
        sinks.retain(|sink| sink.send(envelope.clone()).is_ok());
    }

    fn resolve_waiter(&self, seq: u64, outcome: SdkResult<ChatReply>) {
        if let Some(waiter) = lock_unpoisoned(&self.waiters).remove(&seq) {
            let _ = waiter.send(outcome);
        }
    }

    async fn run_entry(self: &Arc<Self>, entry: PromptQueueEntry) {
        let seq = entry.seq;
        let handle = match self.agent.start_turn(entry.prompt, entry.attachments) {
            Ok(handle) => handle,
            Err(StartTurnError::Busy) => {
                self.resolve_waiter(seq, Err(SdkError::busy()));
                return;
            }
        };

        if self.closed.load(Ordering::SeqCst) {
            self.agent.abort().await;
        }

        let timer = lock_unpoisoned(&self.deadlines).remove(&seq).map(|window| {
            let cancel = handle.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                debug!("submission deadline elapsed, cancelling the turn");
                request_cancel(&cancel);
            })
        });

        let report = handle.wait().await;
        if let Some(timer) = timer {
            timer.abort();
        }

        let outcome = match report.status {
            TurnStatus::Completed => Ok(ChatReply {
                text: report.assistant_text,
                usage: report.usage,
            }),
            TurnStatus::Aborted => Err(report.error.unwrap_or_else(SdkError::cancelled)),
            TurnStatus::Errored => Err(report
                .error
                .unwrap_or_else(|| SdkError::config("turn failed without classification"))),
        };
        self.resolve_waiter(seq, outcome);
    }
}

async fn worker_loop(inner: Arc<SessionInner>) {
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        let entry = lock_unpoisoned(&inner.queue).pop();
        match entry {
            Some(entry) => inner.run_entry(entry).await,
            None => inner.notify.notified().await,
        }
    }
}

/// One interactive session over one agent. All public entry points return
/// [`SdkResult`].
pub struct Session {
    inner: Arc<SessionInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    _subscription: Subscription,
}

impl Session {
    pub fn new(config: SessionConfig) -> SdkResult<Self> {
        let cycle = CycleState::new(config.candidates)?;
        let agent = Agent::new(config.transport, cycle, config.instructions);
        let hooks = HookRegistry::new(config.hooks);

        let inner = Arc::new(SessionInner {
            agent: agent.clone(),
            queue: Mutex::new(PromptQueue::new()),
            waiters: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(HashMap::new()),
            sinks: Mutex::new(Vec::new()),
            hooks,
            instrumentation: config.instrumentation,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = agent.subscribe(Arc::new(move |event: &TurnEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.broadcast(Envelope::Agent(event.clone()));
            }
        }));

        let worker = tokio::spawn(worker_loop(inner.clone()));
        Ok(Self {
            inner,
            worker: Mutex::new(Some(worker)),
            _subscription: subscription,
        })
    }

    /// Build a session, run one queue-mode turn, and tear down, on every
    /// exit path.
    pub async fn one_shot(
        config: SessionConfig,
        prompt: impl Into<String>,
    ) -> SdkResult<ChatReply> {
        let session = Session::new(config)?;
        let reply = session.chat(prompt).await;
        session.close().await;
        reply
    }

    #[must_use]
    pub fn agent(&self) -> &Arc<Agent> {
        &self.inner.agent
    }

    /// Registrations rejected when the session was built.
    #[must_use]
    pub fn hook_load_failures(&self) -> &[SdkError] {
        self.inner.hooks.hook_load_failures()
    }

    /// Submit a prompt and wait for its turn to finish.
    pub async fn submit(
        &self,
        prompt: impl Into<String>,
        options: SubmitOptions,
    ) -> SdkResult<ChatReply> {
        let rx = self.enqueue(prompt, options).await?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SdkError::session_closed()),
        }
    }

    /// Queue-mode submit with default options.
    pub async fn chat(&self, prompt: impl Into<String>) -> SdkResult<ChatReply> {
        self.submit(prompt, SubmitOptions::default()).await
    }

    /// Submit a prompt and return the envelope stream instead of waiting.
    /// The turn's subsequence ends with a terminal agent event.
    pub async fn stream(&self, prompt: impl Into<String>) -> SdkResult<EventStream> {
        let stream = self.events();
        // The waiter is dropped; the caller observes the turn through the
        // stream's terminal agent event.
        let _rx = self.enqueue(prompt, SubmitOptions::default()).await?;
        Ok(stream)
    }

    /// Open a new envelope stream over everything the session emits from
    /// now on.
    #[must_use]
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.inner.closed.load(Ordering::SeqCst) {
            let _ = tx.send(Envelope::Closed);
        } else {
            lock_unpoisoned(&self.inner.sinks).push(tx);
        }
        EventStream { rx }
    }

    /// Deliver a hook-originated message to its registered callback and
    /// fan it out to event streams.
    pub fn inject_hook_message(&self, message: HookMessage) -> SdkResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SdkError::session_closed());
        }
        self.inner.hooks.deliver(&message)?;
        self.inner.broadcast(Envelope::Hook(message));
        Ok(())
    }

    /// Pass one instrumentation event through the configured callback and
    /// fan it out to event streams.
    pub fn emit_instrumentation(&self, event: InstrumentationEvent) -> SdkResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SdkError::session_closed());
        }
        if let Some(callback) = &self.inner.instrumentation {
            callback(&event).map_err(|reason| SdkError::hook(event.name.clone(), reason))?;
        }
        self.inner.broadcast(Envelope::Instrumentation(event));
        Ok(())
    }

    /// Cancel the active turn, if any.
    pub async fn abort(&self) {
        self.inner.agent.abort().await;
    }

    /// Idempotent teardown: aborts the active turn, fails pending waiters
    /// with the cancellation code, closes event streams with
    /// [`Envelope::Closed`], and stops the worker.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing session");

        self.inner.agent.abort().await;

        let pending = lock_unpoisoned(&self.inner.queue).drain();
        {
            let mut waiters = lock_unpoisoned(&self.inner.waiters);
            for entry in pending {
                if let Some(waiter) = waiters.remove(&entry.seq) {
                    let _ = waiter.send(Err(SdkError::cancelled()));
                }
            }
            for (_, waiter) in waiters.drain() {
                let _ = waiter.send(Err(SdkError::cancelled()));
            }
        }
        lock_unpoisoned(&self.inner.deadlines).clear();

        self.inner.notify.notify_one();
        self.inner.broadcast(Envelope::Closed);
        lock_unpoisoned(&self.inner.sinks).clear();

        let worker = lock_unpoisoned(&self.worker).take();
        if let Some(worker) = worker {
            if worker.await.is_err() {
                warn!("session worker panicked during teardown");
            }
        }
    }

    async fn enqueue(
        &self,
        prompt: impl Into<String>,
        options: SubmitOptions,
    ) -> SdkResult<oneshot::Receiver<SdkResult<ChatReply>>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SdkError::session_closed());
        }

        // Capture the interrupt target before the entry becomes poppable;
        // if the worker starts this entry first, the armed signal still
        // belongs to the turn that was active at submission time.
        let interrupt_target = match options.mode {
            DeliveryMode::Interrupt => self.inner.agent.active_turn_cancel(),
            DeliveryMode::Queue => None,
        };

        let (tx, rx) = oneshot::channel();
        {
            // Waiter and deadline registration happen under the queue lock
            // so the worker cannot pop the entry before they exist.
            let mut queue = lock_unpoisoned(&self.inner.queue);
            let seq = queue.push(prompt, options.attachments, options.mode);
            lock_unpoisoned(&self.inner.waiters).insert(seq, tx);
            if let Some(deadline) = options.deadline {
                lock_unpoisoned(&self.inner.deadlines).insert(seq, deadline);
            }
        }

        if let Some(cancel) = interrupt_target {
            request_cancel(&cancel);
        }
        self.inner.notify.notify_one();
        Ok(rx)
    }
}
