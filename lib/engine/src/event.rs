//! Domain events and idempotency keys.

use crate::context::ExecutionContext;
use crate::workflow::TriggerKind;
use chrono::{DateTime, Utc};
use copper_relay_core::{ContactId, EventId, ExecutionId, MessageId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity whose change produced a domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum TriggerSource {
    Message(MessageId),
    Contact(ContactId),
    Event(EventId),
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(id) => id.fmt(f),
            Self::Contact(id) => id.fmt(f),
            Self::Event(id) => id.fmt(f),
        }
    }
}

/// Something that happened in the surrounding system and may fire workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Which trigger kind this event corresponds to.
    pub kind: TriggerKind,
    /// The user in whose account the event occurred.
    pub user_id: UserId,
    /// The entity that produced the event.
    pub source: TriggerSource,
    /// Snapshot of surrounding data, for conditions and templates.
    pub context: ExecutionContext,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        kind: TriggerKind,
        user_id: UserId,
        source: TriggerSource,
        context: ExecutionContext,
    ) -> Self {
        Self {
            kind,
            user_id,
            source,
            context,
            occurred_at: Utc::now(),
        }
    }
}

/// De-duplication key for execution records.
///
/// Admission refuses a second execution whose key matches a live record, so
/// redelivered events and overlapping scanner passes cannot double-fire a
/// workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for an event-driven execution: one firing per (workflow, source
    /// entity, trigger kind).
    #[must_use]
    pub fn derive(workflow_id: WorkflowId, source: TriggerSource, kind: TriggerKind) -> Self {
        Self(format!("{workflow_id}:{source}:{kind}"))
    }

    /// Key for a manual run. Built from the fresh execution id, so manual
    /// runs never collide with automatic ones or each other.
    #[must_use]
    pub fn manual(workflow_id: WorkflowId, execution_id: ExecutionId) -> Self {
        Self(format!("{workflow_id}:{execution_id}:manual"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
