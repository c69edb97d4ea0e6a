//! Execution records: the audit trail of workflow firings.

use crate::event::{DomainEvent, IdempotencyKey, TriggerSource};
use crate::workflow::{TriggerKind, Workflow};
use chrono::{DateTime, Utc};
use copper_relay_core::{ExecutionId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Admitted, waiting for a worker.
    Pending,
    /// An executor is running the actions.
    Running,
    /// Finished. Individual actions may still have failed; see the outcomes.
    Completed,
    /// Aborted by an execution-level fault.
    Failed,
}

impl ExecutionState {
    /// True once the record will never change state again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Classification of an action failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Retried up to the policy limit before being recorded.
    Transient,
    /// Recorded on the first occurrence.
    Permanent,
}

/// What happened when one action ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    /// The handler completed and returned this output.
    Succeeded { output: JsonValue },
    /// Parameter rendering referenced a path absent from the context. The
    /// handler was never invoked.
    UnresolvedVariable { path: String },
    /// The handler failed on every permitted attempt.
    Failed {
        fault: FaultKind,
        error: String,
        attempts: u32,
    },
}

impl ActionResult {
    /// True when the action's side effect happened.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// One action's outcome within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Position of the action in the workflow's authored list.
    pub index: u32,
    /// The action kind that ran.
    pub kind: crate::action::ActionKind,
    /// What happened.
    pub result: ActionResult,
    /// When the action finished.
    pub finished_at: DateTime<Utc>,
}

impl ActionOutcome {
    /// Records a successful action.
    #[must_use]
    pub fn succeeded(index: u32, kind: crate::action::ActionKind, output: JsonValue) -> Self {
        Self {
            index,
            kind,
            result: ActionResult::Succeeded { output },
            finished_at: Utc::now(),
        }
    }

    /// Records an action skipped by an unresolved template variable.
    #[must_use]
    pub fn unresolved(index: u32, kind: crate::action::ActionKind, path: String) -> Self {
        Self {
            index,
            kind,
            result: ActionResult::UnresolvedVariable { path },
            finished_at: Utc::now(),
        }
    }

    /// Records an exhausted or permanently failed action.
    #[must_use]
    pub fn failed(
        index: u32,
        kind: crate::action::ActionKind,
        fault: FaultKind,
        error: String,
        attempts: u32,
    ) -> Self {
        Self {
            index,
            kind,
            result: ActionResult::Failed {
                fault,
                error,
                attempts,
            },
            finished_at: Utc::now(),
        }
    }
}

/// The stored record of one workflow firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier for this execution.
    pub id: ExecutionId,
    /// The workflow that fired.
    pub workflow_id: WorkflowId,
    /// The owning user, copied from the workflow at admission.
    pub user_id: UserId,
    /// The trigger kind that fired the workflow.
    pub trigger_kind: TriggerKind,
    /// The entity that produced the trigger.
    pub source: TriggerSource,
    /// De-duplication key this record was admitted under.
    pub idempotency_key: IdempotencyKey,
    /// True for operator-initiated runs that bypassed admission.
    pub manual: bool,
    /// Current lifecycle state.
    pub state: ExecutionState,
    /// Per-action outcomes, ordered by action index.
    pub outcomes: Vec<ActionOutcome>,
    /// Execution-level error message, set only on `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was admitted.
    pub enqueued_at: DateTime<Utc>,
    /// When an executor picked the record up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the record reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Creates a pending record for an event-driven firing.
    #[must_use]
    pub fn for_event(workflow: &Workflow, event: &DomainEvent) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id: workflow.id,
            user_id: workflow.user_id,
            trigger_kind: event.kind,
            source: event.source,
            idempotency_key: IdempotencyKey::derive(workflow.id, event.source, event.kind),
            manual: false,
            state: ExecutionState::Pending,
            outcomes: Vec::new(),
            error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Creates a pending record for a manual run.
    #[must_use]
    pub fn manual(workflow: &Workflow, source: TriggerSource) -> Self {
        let id = ExecutionId::new();
        Self {
            id,
            workflow_id: workflow.id,
            user_id: workflow.user_id,
            trigger_kind: workflow.trigger.kind(),
            source,
            idempotency_key: IdempotencyKey::manual(workflow.id, id),
            manual: true,
            state: ExecutionState::Pending,
            outcomes: Vec::new(),
            error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Transitions to `Running` and stamps the start time.
    pub fn start(&mut self) {
        self.state = ExecutionState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Inserts an outcome, keeping the list ordered by action index.
    pub fn add_outcome(&mut self, outcome: ActionOutcome) {
        let position = self
            .outcomes
            .partition_point(|existing| existing.index <= outcome.index);
        self.outcomes.insert(position, outcome);
    }

    /// Transitions to `Completed` and stamps the completion time.
    pub fn complete(&mut self) {
        self.state = ExecutionState::Completed;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Transitions to `Failed` with an execution-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = ExecutionState::Failed;
        self.error = Some(error.into());
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Wall-clock duration from start to terminal state, when both are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
