//! Action definitions attached to workflows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameters for a single action, as authored on the workflow.
///
/// Values may contain `{{ path }}` placeholders, rendered against the
/// execution context just before the action runs.
pub type ActionParams = BTreeMap<String, String>;

/// The closed set of action kinds the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send an outbound SMS.
    SendSms,
    /// Send an outbound email.
    SendEmail,
    /// Create a follow-up task.
    CreateTask,
    /// Create a calendar event.
    CreateEvent,
    /// POST a payload to an external webhook.
    CallWebhook,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::SendSms,
        Self::SendEmail,
        Self::CreateTask,
        Self::CreateEvent,
        Self::CallWebhook,
    ];

    /// Returns the snake_case name used on the wire and in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendSms => "send_sms",
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::CreateEvent => "create_event",
            Self::CallWebhook => "call_webhook",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single action as authored on a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    SendSms {
        #[serde(default)]
        params: ActionParams,
    },
    SendEmail {
        #[serde(default)]
        params: ActionParams,
    },
    CreateTask {
        #[serde(default)]
        params: ActionParams,
    },
    CreateEvent {
        #[serde(default)]
        params: ActionParams,
    },
    CallWebhook {
        #[serde(default)]
        params: ActionParams,
    },
}

impl ActionSpec {
    /// Builds a spec for the given kind.
    #[must_use]
    pub fn new(kind: ActionKind, params: ActionParams) -> Self {
        match kind {
            ActionKind::SendSms => Self::SendSms { params },
            ActionKind::SendEmail => Self::SendEmail { params },
            ActionKind::CreateTask => Self::CreateTask { params },
            ActionKind::CreateEvent => Self::CreateEvent { params },
            ActionKind::CallWebhook => Self::CallWebhook { params },
        }
    }

    /// Returns this action's kind.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SendSms { .. } => ActionKind::SendSms,
            Self::SendEmail { .. } => ActionKind::SendEmail,
            Self::CreateTask { .. } => ActionKind::CreateTask,
            Self::CreateEvent { .. } => ActionKind::CreateEvent,
            Self::CallWebhook { .. } => ActionKind::CallWebhook,
        }
    }

    /// Returns this action's authored parameters.
    #[must_use]
    pub fn params(&self) -> &ActionParams {
        match self {
            Self::SendSms { params }
            | Self::SendEmail { params }
            | Self::CreateTask { params }
            | Self::CreateEvent { params }
            | Self::CallWebhook { params } => params,
        }
    }
}
