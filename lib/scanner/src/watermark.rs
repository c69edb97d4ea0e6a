//! Scan watermark persistence.
//!
//! The watermark records the end of the last completed scan window. After a
//! restart the scanner resumes from it, capped at one interval back, so
//! downtime is backfilled at most one window deep.

use crate::error::WatermarkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Persistence seam for the scan watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Returns the end of the last completed scan window, if any.
    async fn load(&self) -> Result<Option<DateTime<Utc>>, WatermarkError>;

    /// Records the end of a completed scan window.
    async fn save(&self, watermark: DateTime<Utc>) -> Result<(), WatermarkError>;
}

/// In-memory [`WatermarkStore`] for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    /// Creates a store with no watermark.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> Result<Option<DateTime<Utc>>, WatermarkError> {
        Ok(*self.watermark.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn save(&self, watermark: DateTime<Utc>) -> Result<(), WatermarkError> {
        *self.watermark.lock().unwrap_or_else(|e| e.into_inner()) = Some(watermark);
        Ok(())
    }
}
