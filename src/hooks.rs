//! Hook modules and instrumentation sinks.
//!
//! Hooks follow a fixed capability contract: an id, a declared JSON-object
//! schema, and a callback. The contract is validated at registration;
//! failures are collected and reported, never allowed to abort session
//! construction.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use turn_protocol::error::{SdkError, SdkResult};

/// A message originated by a hook, injected into the session's envelope
/// stream.
#[derive(Debug, Clone, PartialEq)]
pub struct HookMessage {
    pub hook_id: String,
    pub payload: Value,
}

/// One instrumentation data point emitted through the session.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationEvent {
    pub name: String,
    pub payload: Value,
}

/// Callback invoked once per hook-originated message, synchronously and in
/// event order. An `Err` classifies as a Hook error carrying the hook id.
pub type HookCallback = Arc<dyn Fn(&HookMessage) -> Result<(), String> + Send + Sync>;

/// Callback invoked once per instrumentation event.
pub type InstrumentationCallback =
    Arc<dyn Fn(&InstrumentationEvent) -> Result<(), String> + Send + Sync>;

/// Fixed capability contract for one hook module.
#[derive(Clone)]
pub struct HookModule {
    pub id: String,
    /// Declared message schema; must be a JSON object.
    pub schema: Value,
    pub callback: HookCallback,
}

impl fmt::Debug for HookModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookModule")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Validated hook modules plus the registrations that failed validation.
#[derive(Default)]
pub struct HookRegistry {
    modules: Vec<HookModule>,
    load_failures: Vec<SdkError>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(modules: Vec<HookModule>) -> Self {
        let mut registry = Self::default();
        for module in modules {
            registry.register(module);
        }
        registry
    }

    pub fn register(&mut self, module: HookModule) {
        if module.id.trim().is_empty() {
            warn!("rejecting hook registration with an empty id");
            self.load_failures.push(SdkError::hook(
                "<unnamed>",
                "hook registration requires a non-empty id",
            ));
            return;
        }
        if !module.schema.is_object() {
            warn!(hook_id = %module.id, "rejecting hook with a non-object schema");
            self.load_failures.push(SdkError::hook(
                module.id.clone(),
                "declared hook schema must be a JSON object",
            ));
            return;
        }
        self.modules.push(module);
    }

    /// Registrations rejected at load time. Reported, never fatal.
    #[must_use]
    pub fn hook_load_failures(&self) -> &[SdkError] {
        &self.load_failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Deliver one message to its hook's callback, synchronously.
    pub fn deliver(&self, message: &HookMessage) -> SdkResult<()> {
        let module = self
            .modules
            .iter()
            .find(|module| module.id == message.hook_id)
            .ok_or_else(|| {
                SdkError::hook(message.hook_id.clone(), "no hook registered under this id")
            })?;

        (module.callback)(message)
            .map_err(|reason| SdkError::hook(message.hook_id.clone(), reason))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use turn_protocol::error::ErrorCode;

    use super::{HookMessage, HookModule, HookRegistry};

    fn module(id: &str, schema: serde_json::Value) -> HookModule {
        HookModule {
            id: id.to_string(),
            schema,
            callback: Arc::new(|_| Ok(())),
        }
    }

    #[test]
    fn invalid_registrations_are_collected_not_fatal() {
        let registry = HookRegistry::new(vec![
            module("", json!({})),
            module("bad-schema", json!("not an object")),
            module("good", json!({"type": "object"})),
        ]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.hook_load_failures().len(), 2);
        for failure in registry.hook_load_failures() {
            assert_eq!(failure.code(), ErrorCode::HookFailed);
        }
    }

    #[test]
    fn delivery_reaches_the_registered_callback_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = HookRegistry::new(vec![HookModule {
            id: "notify".to_string(),
            schema: json!({}),
            callback: Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        }]);

        for _ in 0..3 {
            registry
                .deliver(&HookMessage {
                    hook_id: "notify".to_string(),
                    payload: json!({"n": 1}),
                })
                .expect("delivery");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn callback_failures_classify_with_the_hook_id() {
        let registry = HookRegistry::new(vec![HookModule {
            id: "flaky".to_string(),
            schema: json!({}),
            callback: Arc::new(|_| Err("sink exploded".to_string())),
        }]);

        let error = registry
            .deliver(&HookMessage {
                hook_id: "flaky".to_string(),
                payload: json!({}),
            })
            .expect_err("must fail");

        assert_eq!(error.code(), ErrorCode::HookFailed);
        assert!(error.to_string().contains("flaky"));
        assert!(!error.retryable());
    }

    #[test]
    fn unknown_hook_ids_are_hook_errors() {
        let registry = HookRegistry::new(Vec::new());
        let error = registry
            .deliver(&HookMessage {
                hook_id: "ghost".to_string(),
                payload: json!({}),
            })
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::HookFailed);
    }
}
