//! Execution history storage.
//!
//! The store is the engine's single source of truth for what ran, what is
//! running, and what may not run again. Admission de-duplication lives here
//! so that the check and the insert happen under one consistency domain.

use crate::event::{IdempotencyKey, TriggerSource};
use crate::record::{ActionOutcome, ExecutionRecord, ExecutionState};
use async_trait::async_trait;
use copper_relay_core::{ExecutionId, WorkflowId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Errors from the execution store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists with the given id.
    NotFound { id: ExecutionId },
    /// The backing store is unreachable or corrupted.
    Unavailable { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "execution {id} not found"),
            Self::Unavailable { reason } => write!(f, "execution store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of attempting to admit a new execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The record was inserted and should be executed.
    Admitted,
    /// A live record already holds this idempotency key.
    Duplicate { existing: ExecutionId },
}

/// Terminal disposition passed to [`ExecutionStore::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Failed { error: String },
}

/// Persistence seam for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Atomically checks the idempotency key and inserts the record.
    ///
    /// A prior record in any non-`failed` state suppresses admission. A
    /// `failed` prior record does not: a redelivered event is the only way
    /// a failed firing runs again, so it gets a fresh record.
    async fn admit(&self, record: ExecutionRecord) -> Result<Admission, StoreError>;

    /// Inserts a record without an idempotency check. Used for manual runs,
    /// whose keys are unique by construction.
    async fn insert(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Fetches a record by id.
    async fn get(&self, id: ExecutionId) -> Result<ExecutionRecord, StoreError>;

    /// Fetches the record currently holding an idempotency key, if any.
    async fn find_by_key(&self, key: &IdempotencyKey)
    -> Result<Option<ExecutionRecord>, StoreError>;

    /// Transitions a record to `running`.
    async fn mark_running(&self, id: ExecutionId) -> Result<(), StoreError>;

    /// Appends an action outcome to a record.
    async fn push_outcome(&self, id: ExecutionId, outcome: ActionOutcome)
    -> Result<(), StoreError>;

    /// Transitions a record to its terminal state.
    async fn finalize(&self, id: ExecutionId, disposition: Disposition) -> Result<(), StoreError>;

    /// Lists records for a workflow, newest first.
    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Lists records fired by a given source entity, newest first.
    async fn list_for_source(
        &self,
        source: TriggerSource,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Counts all records ever admitted for a workflow.
    async fn execution_count(&self, workflow_id: WorkflowId) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct Inner {
    records: HashMap<ExecutionId, ExecutionRecord>,
    by_key: HashMap<IdempotencyKey, ExecutionId>,
}

/// In-memory [`ExecutionStore`] for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryExecutionStore {
    inner: Mutex<Inner>,
}

impl MemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Unavailable {
            reason: "store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn admit(&self, record: ExecutionRecord) -> Result<Admission, StoreError> {
        let mut inner = self.lock()?;

        if let Some(&existing_id) = inner.by_key.get(&record.idempotency_key) {
            let live = inner
                .records
                .get(&existing_id)
                .is_some_and(|existing| existing.state != ExecutionState::Failed);
            if live {
                return Ok(Admission::Duplicate {
                    existing: existing_id,
                });
            }
        }

        inner.by_key.insert(record.idempotency_key.clone(), record.id);
        inner.records.insert(record.id, record);
        Ok(Admission::Admitted)
    }

    async fn insert(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.by_key.insert(record.idempotency_key.clone(), record.id);
        inner.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<ExecutionRecord, StoreError> {
        self.lock()?
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn find_by_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .by_key
            .get(key)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn mark_running(&self, id: ExecutionId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        record.start();
        Ok(())
    }

    async fn push_outcome(
        &self,
        id: ExecutionId,
        outcome: ActionOutcome,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        record.add_outcome(outcome);
        Ok(())
    }

    async fn finalize(&self, id: ExecutionId, disposition: Disposition) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        match disposition {
            Disposition::Completed => record.complete(),
            Disposition::Failed { error } => record.fail(error),
        }
        Ok(())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<ExecutionRecord> = inner
            .records
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        Ok(records)
    }

    async fn list_for_source(
        &self,
        source: TriggerSource,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<ExecutionRecord> = inner
            .records
            .values()
            .filter(|r| r.source == source)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        Ok(records)
    }

    async fn execution_count(&self, workflow_id: WorkflowId) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .count() as u64)
    }
}
