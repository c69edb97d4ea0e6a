//! Error types for the scanner crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CalendarError`: Errors from the event calendar collaborator
//! - `WatermarkError`: Errors from watermark persistence
//! - `ScanError`: High-level wrapper for a failed scan pass

use copper_relay_engine::{DirectoryError, DispatchError};
use std::fmt;

/// Errors from the event calendar collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// The calendar backend is unreachable.
    Unavailable { reason: String },
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "event calendar unavailable: {reason}"),
        }
    }
}

impl std::error::Error for CalendarError {}

/// Errors from watermark persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkError {
    /// The watermark store is unreachable.
    Unavailable { reason: String },
}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "watermark store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for WatermarkError {}

/// A failed scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    Calendar(CalendarError),
    Watermark(WatermarkError),
    Directory(DirectoryError),
    Dispatch(DispatchError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calendar(e) => write!(f, "scan failed: {e}"),
            Self::Watermark(e) => write!(f, "scan failed: {e}"),
            Self::Directory(e) => write!(f, "scan failed: {e}"),
            Self::Dispatch(e) => write!(f, "scan failed: {e}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<CalendarError> for ScanError {
    fn from(e: CalendarError) -> Self {
        Self::Calendar(e)
    }
}

impl From<WatermarkError> for ScanError {
    fn from(e: WatermarkError) -> Self {
        Self::Watermark(e)
    }
}

impl From<DirectoryError> for ScanError {
    fn from(e: DirectoryError) -> Self {
        Self::Directory(e)
    }
}

impl From<DispatchError> for ScanError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}
