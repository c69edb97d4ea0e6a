//! The time-based trigger scanner.
//!
//! The scanner turns the passage of time into domain events. On a fixed
//! interval it walks every enabled `time_before_event` workflow, computes
//! each upcoming event's fire time (`start_time - offset`), and admits a
//! synthetic event for every fire time inside the current scan window.
//!
//! The window is `[window_start, now)` where `window_start` is the persisted
//! watermark, capped at one interval back. Admission idempotency in the
//! dispatcher makes overlapping windows safe. Events whose start time is
//! already past are never fired, regardless of their fire time.

use crate::calendar::{CalendarEvent, EventCalendar};
use crate::error::ScanError;
use crate::watermark::WatermarkStore;
use chrono::{DateTime, Utc};
use copper_relay_engine::{
    DomainEvent, Dispatcher, ExecutionContext, ExecutionStore, Namespace, TriggerKind,
    TriggerSource, Workflow, WorkflowDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Periodically fires workflows ahead of calendar events.
pub struct TriggerScanner<D, S, C, W> {
    dispatcher: Arc<Dispatcher<D, S>>,
    directory: Arc<D>,
    calendar: Arc<C>,
    watermark: Arc<W>,
    interval: Duration,
}

impl<D, S, C, W> TriggerScanner<D, S, C, W>
where
    D: WorkflowDirectory,
    S: ExecutionStore,
    C: EventCalendar,
    W: WatermarkStore,
{
    /// Creates a scanner with the given pass interval.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher<D, S>>,
        directory: Arc<D>,
        calendar: Arc<C>,
        watermark: Arc<W>,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            calendar,
            watermark,
            interval,
        }
    }

    /// Runs scan passes on the configured interval until the task is
    /// cancelled. A failed pass is logged and retried on the next tick.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "trigger scanner started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match self.scan_once(Utc::now()).await {
                Ok(fired) if fired > 0 => info!(fired, "scan pass admitted executions"),
                Ok(_) => debug!("scan pass found nothing due"),
                Err(e) => error!(error = %e, "scan pass failed"),
            }
        }
    }

    /// Performs one scan pass ending at `now`.
    ///
    /// Returns the number of executions admitted. The watermark advances to
    /// `now` only after a pass completes, so a pass that dies mid-way is
    /// re-covered by the next one.
    ///
    /// # Errors
    ///
    /// Fails on calendar, directory, watermark, or dispatch faults.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> Result<usize, ScanError> {
        let interval = chrono::Duration::seconds(self.interval.as_secs() as i64);
        let floor = now - interval;
        let window_start = match self.watermark.load().await? {
            Some(watermark) => watermark.max(floor),
            None => floor,
        };
        if window_start >= now {
            return Ok(0);
        }

        let workflows = self.directory.enabled_time_based().await?;
        debug!(
            window_start = %window_start,
            window_end = %now,
            workflows = workflows.len(),
            "scanning time-based workflows"
        );

        let mut fired = 0;
        for workflow in &workflows {
            fired += self.scan_workflow(workflow, window_start, now).await?;
        }

        self.watermark.save(now).await?;
        Ok(fired)
    }

    async fn scan_workflow(
        &self,
        workflow: &Workflow,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, ScanError> {
        let Some(offset) = workflow.trigger.offset() else {
            return Ok(0);
        };

        let horizon = now + offset;
        let events = self.calendar.upcoming(workflow.user_id, horizon).await?;

        let mut fired = 0;
        for event in &events {
            if event.start_time < now {
                continue;
            }
            let fire_time = event.start_time - offset;
            if fire_time < window_start || fire_time >= now {
                continue;
            }

            let domain_event = DomainEvent::new(
                TriggerKind::TimeBeforeEvent,
                workflow.user_id,
                TriggerSource::Event(event.id),
                event_context(event),
            );
            if let Some(handle) = self.dispatcher.dispatch_to(workflow.id, &domain_event).await? {
                info!(
                    execution_id = %handle.execution_id,
                    workflow_id = %workflow.id,
                    event_id = %event.id,
                    start_time = %event.start_time,
                    "time-based trigger fired"
                );
                fired += 1;
            }
        }
        Ok(fired)
    }
}

fn event_context(event: &CalendarEvent) -> ExecutionContext {
    ExecutionContext::builder()
        .field(Namespace::Event, "title", event.title.clone())
        .field(Namespace::Event, "start_time", event.start_time.to_rfc3339())
        .fields(Namespace::Event, event.details.clone())
        .build()
}
