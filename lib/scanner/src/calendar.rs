//! Event calendar collaborator.

use crate::error::CalendarError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copper_relay_core::{EventId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A calendar event as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Unique identifier.
    pub id: EventId,
    /// The owning user.
    pub user_id: UserId,
    /// Event title.
    pub title: String,
    /// When the event starts. Fire times are computed from this.
    pub start_time: DateTime<Utc>,
    /// Additional fields exposed to conditions and templates under the
    /// `event` namespace.
    #[serde(default)]
    pub details: BTreeMap<String, JsonValue>,
}

impl CalendarEvent {
    /// Creates an event with no extra details.
    #[must_use]
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            user_id,
            title: title.into(),
            start_time,
            details: BTreeMap::new(),
        }
    }

    /// Adds a detail field.
    #[must_use]
    pub fn with_detail(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(name.into(), value.into());
        self
    }
}

/// Read seam over upcoming calendar events.
#[async_trait]
pub trait EventCalendar: Send + Sync {
    /// Lists a user's events starting at or before the horizon, ordered by
    /// start time.
    async fn upcoming(
        &self,
        user_id: UserId,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;
}

/// In-memory [`EventCalendar`] for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryEventCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

impl MemoryEventCalendar {
    /// Creates an empty calendar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event.
    pub fn add(&self, event: CalendarEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CalendarEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventCalendar for MemoryEventCalendar {
    async fn upcoming(
        &self,
        user_id: UserId,
        horizon: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut events: Vec<CalendarEvent> = self
            .lock()
            .iter()
            .filter(|e| e.user_id == user_id && e.start_time <= horizon)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(events)
    }
}
