//! Action handlers: the seam between the engine and the outside world.
//!
//! The engine never talks to SMS gateways, mail servers, or webhooks itself.
//! It resolves each action kind to a registered [`ActionHandler`] and invokes
//! it with fully rendered parameters.

use crate::action::{ActionKind, ActionParams};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A handler invocation failure, classified for retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The failure may clear on its own (timeout, throttling, flaky remote).
    /// The executor retries these with backoff.
    Transient { message: String },
    /// The failure will not clear by retrying (bad address, rejected
    /// payload). The executor fails the action immediately.
    Permanent { message: String },
}

impl HandlerError {
    /// True for failures the executor should retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { message } => write!(f, "transient failure: {message}"),
            Self::Permanent { message } => write!(f, "permanent failure: {message}"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Executes one kind of side effect.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Performs the side effect and returns a JSON description of what was
    /// done (message id, created entity, response body).
    async fn invoke(&self, params: &ActionParams) -> Result<JsonValue, HandlerError>;

    /// Upper bound on a single invocation. A call that overruns is treated
    /// as a transient failure.
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Maps action kinds to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a kind, replacing any previous one.
    #[must_use]
    pub fn register(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Looks up the handler for a kind.
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(ActionKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

/// A scripted handler for tests and wiring checks.
///
/// Returns responses from a script in order, then falls back to a fixed
/// result. Records every invocation's parameters.
pub struct ScriptedHandler {
    fallback: Result<JsonValue, HandlerError>,
    script: Mutex<VecDeque<Result<JsonValue, HandlerError>>>,
    invocations: Mutex<Vec<ActionParams>>,
}

impl ScriptedHandler {
    /// A handler that always succeeds with the given output.
    #[must_use]
    pub fn succeeding(output: JsonValue) -> Self {
        Self {
            fallback: Ok(output),
            script: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// A handler that always fails with the given error.
    #[must_use]
    pub fn failing(error: HandlerError) -> Self {
        Self {
            fallback: Err(error),
            script: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Prepends scripted responses consumed before the fallback applies.
    #[must_use]
    pub fn with_script(
        self,
        responses: impl IntoIterator<Item = Result<JsonValue, HandlerError>>,
    ) -> Self {
        self.script.lock().unwrap().extend(responses);
        self
    }

    /// Returns the parameters of every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<ActionParams> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for ScriptedHandler {
    async fn invoke(&self, params: &ActionParams) -> Result<JsonValue, HandlerError> {
        self.invocations.lock().unwrap().push(params.clone());
        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }
        self.fallback.clone()
    }
}
