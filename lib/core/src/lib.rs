//! Core domain types and utilities for the copper-relay automation platform.
//!
//! This crate provides the foundational typed identifiers and error handling
//! shared by the workflow automation engine and its time-based scanner.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ContactId, EventId, ExecutionId, MessageId, TaskId, UserId, WorkflowId};
