//! Error types for the engine crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ValidationError`: Malformed workflow definitions, rejected at save time
//! - `TemplateError`: Template rendering failures, recorded per action
//! - `EngineError`: Execution-level faults that fail a whole execution
//!
//! Collaborator-seam errors (`StoreError`, `DirectoryError`, `HandlerError`)
//! live next to their traits.

use crate::store::StoreError;
use copper_relay_core::WorkflowId;
use std::fmt;

/// Errors from workflow validation.
///
/// These are raised when a workflow is saved, never at run time: a stored
/// workflow is structurally valid by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The workflow name is empty or whitespace-only.
    EmptyName,
    /// The workflow declares no actions.
    NoActions,
    /// An `all`/`any` condition branch has no children.
    EmptyConditionBranch { combinator: &'static str },
    /// A time-based trigger has a zero offset.
    ZeroOffset,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "workflow name must not be empty"),
            Self::NoActions => write!(f, "workflow must declare at least one action"),
            Self::EmptyConditionBranch { combinator } => {
                write!(f, "'{combinator}' condition must have at least one child")
            }
            Self::ZeroOffset => {
                write!(f, "time-based trigger offset must be at least one minute")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors from template rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template references a path with no value in the context.
    ///
    /// This is a hard stop for the referencing action: a partially rendered
    /// outbound message is worse than no message.
    UnresolvedVariable { path: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedVariable { path } => {
                write!(f, "unresolved template variable: {path}")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Execution-level faults.
///
/// These abort a whole execution and mark its record `failed`, unlike
/// per-action faults which are swallowed into that action's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The execution store failed mid-execution.
    Store(StoreError),
    /// The workflow definition could not be loaded.
    WorkflowUnavailable {
        workflow_id: WorkflowId,
        reason: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "execution store error: {e}"),
            Self::WorkflowUnavailable {
                workflow_id,
                reason,
            } => {
                write!(f, "workflow {workflow_id} could not be loaded: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
