//! Trigger dispatch: matching domain events to workflows and admitting
//! executions.
//!
//! The dispatcher is the only writer of new execution records. It pairs the
//! workflow directory (what could fire) with the execution store (what has
//! already fired) and hands admitted work to the execution worker over a
//! bounded queue.

use crate::context::ExecutionContext;
use crate::error::{EngineError, ValidationError};
use crate::event::{DomainEvent, TriggerSource};
use crate::executor::ActionExecutor;
use crate::record::ExecutionRecord;
use crate::store::{Admission, ExecutionStore, StoreError};
use crate::workflow::{TriggerKind, Workflow};
use async_trait::async_trait;
use copper_relay_core::{ExecutionId, UserId, WorkflowId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Errors from the workflow directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No workflow exists with the given id.
    NotFound { workflow_id: WorkflowId },
    /// The backing directory is unreachable.
    Unavailable { reason: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { workflow_id } => write!(f, "workflow {workflow_id} not found"),
            Self::Unavailable { reason } => {
                write!(f, "workflow directory unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Read seam over stored workflow definitions.
#[async_trait]
pub trait WorkflowDirectory: Send + Sync {
    /// Lists enabled workflows owned by a user that subscribe to a trigger
    /// kind.
    async fn enabled_for_trigger(
        &self,
        user_id: UserId,
        kind: TriggerKind,
    ) -> Result<Vec<Workflow>, DirectoryError>;

    /// Fetches one workflow by id, enabled or not.
    async fn get(&self, workflow_id: WorkflowId) -> Result<Workflow, DirectoryError>;

    /// Lists every enabled time-based workflow across all users.
    async fn enabled_time_based(&self) -> Result<Vec<Workflow>, DirectoryError>;
}

/// In-memory [`WorkflowDirectory`] for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryWorkflowDirectory {
    workflows: Mutex<HashMap<WorkflowId, Workflow>>,
}

impl MemoryWorkflowDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a workflow, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem in the definition. Invalid
    /// workflows are never stored.
    pub fn save(&self, workflow: Workflow) -> Result<(), ValidationError> {
        workflow.validate()?;
        self.lock().insert(workflow.id, workflow);
        Ok(())
    }

    /// Removes a workflow. Existing execution records are untouched.
    pub fn remove(&self, workflow_id: WorkflowId) {
        self.lock().remove(&workflow_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WorkflowId, Workflow>> {
        self.workflows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkflowDirectory for MemoryWorkflowDirectory {
    async fn enabled_for_trigger(
        &self,
        user_id: UserId,
        kind: TriggerKind,
    ) -> Result<Vec<Workflow>, DirectoryError> {
        let mut matched: Vec<Workflow> = self
            .lock()
            .values()
            .filter(|w| w.enabled && w.user_id == user_id && w.trigger.kind() == kind)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn get(&self, workflow_id: WorkflowId) -> Result<Workflow, DirectoryError> {
        self.lock()
            .get(&workflow_id)
            .cloned()
            .ok_or(DirectoryError::NotFound { workflow_id })
    }

    async fn enabled_time_based(&self) -> Result<Vec<Workflow>, DirectoryError> {
        let mut matched: Vec<Workflow> = self
            .lock()
            .values()
            .filter(|w| w.enabled && w.trigger.kind() == TriggerKind::TimeBeforeEvent)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }
}

/// Reference to an admitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
}

/// Unit of work handed to the execution worker.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub context: ExecutionContext,
}

/// Errors from dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Directory(DirectoryError),
    Store(StoreError),
    /// The worker's queue is closed; the process is shutting down.
    QueueClosed,
    /// A manual run's synchronous execution failed.
    Execution(EngineError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(e) => write!(f, "workflow directory error: {e}"),
            Self::Store(e) => write!(f, "execution store error: {e}"),
            Self::QueueClosed => write!(f, "execution queue is closed"),
            Self::Execution(e) => write!(f, "execution error: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<DirectoryError> for DispatchError {
    fn from(e: DirectoryError) -> Self {
        Self::Directory(e)
    }
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<EngineError> for DispatchError {
    fn from(e: EngineError) -> Self {
        Self::Execution(e)
    }
}

/// Routes domain events into admitted executions.
pub struct Dispatcher<D, S> {
    directory: Arc<D>,
    store: Arc<S>,
    executor: Arc<ActionExecutor<S>>,
    queue: mpsc::Sender<ExecutionRequest>,
}

impl<D, S> Dispatcher<D, S>
where
    D: WorkflowDirectory,
    S: ExecutionStore,
{
    /// Creates a dispatcher feeding the given worker queue.
    #[must_use]
    pub fn new(
        directory: Arc<D>,
        store: Arc<S>,
        executor: Arc<ActionExecutor<S>>,
        queue: mpsc::Sender<ExecutionRequest>,
    ) -> Self {
        Self {
            directory,
            store,
            executor,
            queue,
        }
    }

    /// Fans a domain event out to every matching enabled workflow.
    ///
    /// Returns a handle per admitted execution. Duplicates are suppressed
    /// silently; an event that matches nothing returns an empty list.
    ///
    /// # Errors
    ///
    /// Fails on directory or store faults, or when the worker queue has
    /// closed.
    pub async fn dispatch(
        &self,
        event: &DomainEvent,
    ) -> Result<Vec<ExecutionHandle>, DispatchError> {
        let workflows = self
            .directory
            .enabled_for_trigger(event.user_id, event.kind)
            .await?;
        debug!(
            kind = %event.kind,
            source = %event.source,
            matched = workflows.len(),
            "dispatching event"
        );

        let mut handles = Vec::new();
        for workflow in &workflows {
            if let Some(handle) = self.admit(workflow, event).await? {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// Admits a domain event against one specific workflow.
    ///
    /// Used by the time-based scanner, which has already decided which
    /// workflow a due event belongs to. Returns `None` when the workflow is
    /// disabled, subscribes to a different trigger kind, or the event is a
    /// duplicate.
    ///
    /// # Errors
    ///
    /// Fails on directory or store faults, or when the worker queue has
    /// closed.
    pub async fn dispatch_to(
        &self,
        workflow_id: WorkflowId,
        event: &DomainEvent,
    ) -> Result<Option<ExecutionHandle>, DispatchError> {
        let workflow = self.directory.get(workflow_id).await?;
        if !workflow.enabled || workflow.trigger.kind() != event.kind {
            return Ok(None);
        }
        self.admit(&workflow, event).await
    }

    /// Runs a workflow immediately, bypassing admission de-duplication.
    ///
    /// The run still produces a full execution record, flagged as manual.
    /// Unlike event dispatch this executes synchronously and returns the
    /// terminal record.
    ///
    /// # Errors
    ///
    /// Fails on directory or store faults, or when execution aborts.
    pub async fn run_now(
        &self,
        workflow_id: WorkflowId,
        source: TriggerSource,
        context: ExecutionContext,
    ) -> Result<ExecutionRecord, DispatchError> {
        let workflow = self.directory.get(workflow_id).await?;
        let record = ExecutionRecord::manual(&workflow, source);
        let execution_id = record.id;
        self.store.insert(record).await?;

        info!(
            execution_id = %execution_id,
            workflow_id = %workflow_id,
            "manual run admitted"
        );
        self.executor
            .execute(execution_id, &workflow, &context)
            .await?;
        Ok(self.store.get(execution_id).await?)
    }

    async fn admit(
        &self,
        workflow: &Workflow,
        event: &DomainEvent,
    ) -> Result<Option<ExecutionHandle>, DispatchError> {
        let record = ExecutionRecord::for_event(workflow, event);
        let execution_id = record.id;

        match self.store.admit(record).await? {
            Admission::Admitted => {
                info!(
                    execution_id = %execution_id,
                    workflow_id = %workflow.id,
                    kind = %event.kind,
                    source = %event.source,
                    "execution admitted"
                );
                self.queue
                    .send(ExecutionRequest {
                        execution_id,
                        workflow_id: workflow.id,
                        context: event.context.clone(),
                    })
                    .await
                    .map_err(|_| DispatchError::QueueClosed)?;
                Ok(Some(ExecutionHandle {
                    execution_id,
                    workflow_id: workflow.id,
                }))
            }
            Admission::Duplicate { existing } => {
                debug!(
                    workflow_id = %workflow.id,
                    source = %event.source,
                    existing = %existing,
                    "duplicate event suppressed"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ActionParams, ActionSpec};
    use crate::handler::{HandlerRegistry, ScriptedHandler};
    use crate::record::ExecutionState;
    use crate::store::MemoryExecutionStore;
    use crate::workflow::TriggerConfig;
    use copper_relay_core::{ContactId, MessageId};
    use serde_json::json;

    struct Fixture {
        directory: Arc<MemoryWorkflowDirectory>,
        store: Arc<MemoryExecutionStore>,
        dispatcher: Dispatcher<MemoryWorkflowDirectory, MemoryExecutionStore>,
        queue: mpsc::Receiver<ExecutionRequest>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(MemoryWorkflowDirectory::new());
        let store = Arc::new(MemoryExecutionStore::new());
        let registry = Arc::new(HandlerRegistry::new().register(
            ActionKind::SendSms,
            Arc::new(ScriptedHandler::succeeding(json!({"sent": true}))),
        ));
        let executor = Arc::new(ActionExecutor::new(store.clone(), registry));
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(directory.clone(), store.clone(), executor, tx);
        Fixture {
            directory,
            store,
            dispatcher,
            queue: rx,
        }
    }

    fn message_workflow(user_id: UserId) -> Workflow {
        Workflow::new(user_id, "Auto-reply", TriggerConfig::MessageReceived)
            .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new()))
    }

    fn message_event(user_id: UserId) -> DomainEvent {
        DomainEvent::new(
            TriggerKind::MessageReceived,
            user_id,
            TriggerSource::Message(MessageId::new()),
            ExecutionContext::default(),
        )
    }

    #[tokio::test]
    async fn dispatch_admits_matching_workflows() {
        let mut fx = fixture();
        let user_id = UserId::new();
        let workflow = message_workflow(user_id);
        fx.directory.save(workflow.clone()).unwrap();

        let handles = fx.dispatcher.dispatch(&message_event(user_id)).await.unwrap();

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].workflow_id, workflow.id);

        let request = fx.queue.recv().await.expect("queued request");
        assert_eq!(request.execution_id, handles[0].execution_id);

        let record = fx.store.get(handles[0].execution_id).await.unwrap();
        assert_eq!(record.state, ExecutionState::Pending);
    }

    #[tokio::test]
    async fn dispatch_skips_other_users_and_kinds() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.directory.save(message_workflow(UserId::new())).unwrap();
        fx.directory
            .save(
                Workflow::new(user_id, "On contact", TriggerConfig::ContactCreated)
                    .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new())),
            )
            .unwrap();

        let handles = fx.dispatcher.dispatch(&message_event(user_id)).await.unwrap();
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn dispatch_skips_disabled_workflows() {
        let fx = fixture();
        let user_id = UserId::new();
        let mut workflow = message_workflow(user_id);
        workflow.disable();
        fx.directory.save(workflow).unwrap();

        let handles = fx.dispatcher.dispatch(&message_event(user_id)).await.unwrap();
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn redelivered_event_is_admitted_once() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.directory.save(message_workflow(user_id)).unwrap();
        let event = message_event(user_id);

        let first = fx.dispatcher.dispatch(&event).await.unwrap();
        let second = fx.dispatcher.dispatch(&event).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(
            fx.store.execution_count(first[0].workflow_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn dispatch_to_targets_a_single_workflow() {
        let fx = fixture();
        let user_id = UserId::new();
        let target = message_workflow(user_id);
        let sibling = message_workflow(user_id);
        fx.directory.save(target.clone()).unwrap();
        fx.directory.save(sibling.clone()).unwrap();

        let handle = fx
            .dispatcher
            .dispatch_to(target.id, &message_event(user_id))
            .await
            .unwrap()
            .expect("admitted");

        assert_eq!(handle.workflow_id, target.id);
        assert_eq!(fx.store.execution_count(sibling.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dispatch_to_refuses_mismatched_kind() {
        let fx = fixture();
        let user_id = UserId::new();
        let workflow = Workflow::new(user_id, "On contact", TriggerConfig::ContactCreated)
            .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new()));
        fx.directory.save(workflow.clone()).unwrap();

        let admitted = fx
            .dispatcher
            .dispatch_to(workflow.id, &message_event(user_id))
            .await
            .unwrap();
        assert!(admitted.is_none());
    }

    #[tokio::test]
    async fn run_now_bypasses_deduplication() {
        let fx = fixture();
        let user_id = UserId::new();
        let workflow = message_workflow(user_id);
        fx.directory.save(workflow.clone()).unwrap();
        let source = TriggerSource::Contact(ContactId::new());

        let first = fx
            .dispatcher
            .run_now(workflow.id, source, ExecutionContext::default())
            .await
            .unwrap();
        let second = fx
            .dispatcher
            .run_now(workflow.id, source, ExecutionContext::default())
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.manual && second.manual);
        assert_eq!(first.state, ExecutionState::Completed);
        assert_eq!(second.state, ExecutionState::Completed);
        assert_eq!(fx.store.execution_count(workflow.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn run_now_unknown_workflow_fails() {
        let fx = fixture();
        let workflow_id = WorkflowId::new();
        let err = fx
            .dispatcher
            .run_now(
                workflow_id,
                TriggerSource::Contact(ContactId::new()),
                ExecutionContext::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Directory(DirectoryError::NotFound { workflow_id })
        );
    }

    #[tokio::test]
    async fn save_rejects_invalid_workflows() {
        let fx = fixture();
        let user_id = UserId::new();
        let invalid = Workflow::new(user_id, "No actions", TriggerConfig::MessageReceived);

        assert_eq!(fx.directory.save(invalid.clone()), Err(ValidationError::NoActions));
        assert!(fx.directory.get(invalid.id).await.is_err());
    }
}
