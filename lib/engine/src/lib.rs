//! Workflow automation engine for the copper-relay platform.
//!
//! This crate provides trigger-driven workflow execution, including:
//!
//! - **Definitions**: Workflows with triggers, condition trees, and actions
//! - **Dispatch**: Event fan-out with idempotent admission per (workflow, source, trigger)
//! - **Conditions**: Pure boolean expression trees over context field paths
//! - **Templates**: `{{ path }}` substitution into action parameters
//! - **Execution**: Concurrent action runs with classified retry and backoff
//! - **History**: Per-action outcomes and lifecycle timestamps in an execution store

pub mod action;
pub mod condition;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod executor;
pub mod handler;
pub mod record;
pub mod store;
pub mod template;
pub mod worker;
pub mod workflow;

pub use action::{ActionKind, ActionParams, ActionSpec};
pub use condition::{Condition, Operator, evaluate};
pub use context::{ContextBuilder, ExecutionContext, Namespace};
pub use dispatcher::{
    DirectoryError, DispatchError, Dispatcher, ExecutionHandle, ExecutionRequest,
    MemoryWorkflowDirectory, WorkflowDirectory,
};
pub use error::{EngineError, TemplateError, ValidationError};
pub use event::{DomainEvent, IdempotencyKey, TriggerSource};
pub use executor::{ActionExecutor, RetryPolicy};
pub use handler::{ActionHandler, HandlerError, HandlerRegistry, ScriptedHandler};
pub use record::{ActionOutcome, ActionResult, ExecutionRecord, ExecutionState, FaultKind};
pub use store::{Admission, Disposition, ExecutionStore, MemoryExecutionStore, StoreError};
pub use worker::ExecutionWorker;
pub use workflow::{TriggerConfig, TriggerKind, Workflow};
