//! Workflow definitions.

use crate::action::ActionSpec;
use crate::condition::Condition;
use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use copper_relay_core::{UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of trigger kinds a workflow can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// An inbound message arrived.
    MessageReceived,
    /// A contact record was created.
    ContactCreated,
    /// A calendar event was created.
    EventCreated,
    /// A calendar event's start time is approaching.
    TimeBeforeEvent,
}

impl TriggerKind {
    /// Returns the snake_case name used on the wire and in idempotency keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::ContactCreated => "contact_created",
            Self::EventCreated => "event_created",
            Self::TimeBeforeEvent => "time_before_event",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow's trigger, with any kind-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    MessageReceived,
    ContactCreated,
    EventCreated,
    /// Fires when a calendar event's start falls within `offset_minutes` of
    /// the current time.
    TimeBeforeEvent { offset_minutes: u32 },
}

impl TriggerConfig {
    /// Returns the kind of this trigger.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::MessageReceived => TriggerKind::MessageReceived,
            Self::ContactCreated => TriggerKind::ContactCreated,
            Self::EventCreated => TriggerKind::EventCreated,
            Self::TimeBeforeEvent { .. } => TriggerKind::TimeBeforeEvent,
        }
    }

    /// Returns the lead time for time-based triggers.
    #[must_use]
    pub fn offset(&self) -> Option<Duration> {
        match self {
            Self::TimeBeforeEvent { offset_minutes } => {
                Some(Duration::minutes(i64::from(*offset_minutes)))
            }
            _ => None,
        }
    }
}

/// A user-authored automation: trigger, optional condition, ordered actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// The user who owns this workflow. Triggers only match events for the
    /// same owner.
    pub user_id: UserId,
    /// Human-readable name. Must not be empty.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What fires this workflow.
    pub trigger: TriggerConfig,
    /// Optional gate evaluated against the execution context. Absent means
    /// the workflow always runs when triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Actions executed when the workflow fires, in authored order.
    pub actions: Vec<ActionSpec>,
    /// Disabled workflows are invisible to dispatch and the scanner.
    pub enabled: bool,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates an enabled workflow with no condition and no actions.
    #[must_use]
    pub fn new(user_id: UserId, name: impl Into<String>, trigger: TriggerConfig) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            user_id,
            name: name.into(),
            description: None,
            trigger,
            condition: None,
            actions: Vec::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the condition gate.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Marks the workflow enabled.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.touch();
    }

    /// Marks the workflow disabled.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.touch();
    }

    /// Bumps the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Checks the definition for structural problems.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: empty name, no actions, an empty
    /// condition branch, or a zero time-based offset.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions);
        }
        if let Some(condition) = &self.condition {
            condition.validate()?;
        }
        if let TriggerConfig::TimeBeforeEvent { offset_minutes } = self.trigger
            && offset_minutes == 0
        {
            return Err(ValidationError::ZeroOffset);
        }
        Ok(())
    }
}
