//! Time-based trigger scanning for the copper-relay platform.
//!
//! This crate provides:
//!
//! - **Event Calendar**: Collaborator seam over upcoming calendar events
//! - **Watermark**: Persisted scan progress with one-window backfill
//! - **Scanner**: Interval loop that admits pre-event workflow executions

pub mod calendar;
pub mod error;
pub mod scanner;
pub mod watermark;

pub use calendar::{CalendarEvent, EventCalendar, MemoryEventCalendar};
pub use error::{CalendarError, ScanError, WatermarkError};
pub use scanner::TriggerScanner;
pub use watermark::{MemoryWatermarkStore, WatermarkStore};
