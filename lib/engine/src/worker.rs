//! Background execution worker.
//!
//! The worker drains the dispatcher's queue and runs each admitted execution
//! on its own task, so one slow handler never blocks the rest of the queue.

use crate::dispatcher::{ExecutionRequest, WorkflowDirectory};
use crate::error::EngineError;
use crate::executor::ActionExecutor;
use crate::store::{Disposition, ExecutionStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Consumes [`ExecutionRequest`]s and runs them to completion.
pub struct ExecutionWorker<D, S> {
    directory: Arc<D>,
    store: Arc<S>,
    executor: Arc<ActionExecutor<S>>,
    queue: mpsc::Receiver<ExecutionRequest>,
}

impl<D, S> ExecutionWorker<D, S>
where
    D: WorkflowDirectory + 'static,
    S: ExecutionStore + 'static,
{
    /// Creates a worker draining the given queue.
    #[must_use]
    pub fn new(
        directory: Arc<D>,
        store: Arc<S>,
        executor: Arc<ActionExecutor<S>>,
        queue: mpsc::Receiver<ExecutionRequest>,
    ) -> Self {
        Self {
            directory,
            store,
            executor,
            queue,
        }
    }

    /// Runs until every dispatcher handle is dropped and the queue drains.
    pub async fn run(mut self) {
        info!("execution worker started");
        while let Some(request) = self.queue.recv().await {
            let directory = self.directory.clone();
            let store = self.store.clone();
            let executor = self.executor.clone();
            tokio::spawn(async move {
                process(directory, store, executor, request).await;
            });
        }
        info!("execution worker stopped");
    }
}

async fn process<D, S>(
    directory: Arc<D>,
    store: Arc<S>,
    executor: Arc<ActionExecutor<S>>,
    request: ExecutionRequest,
) where
    D: WorkflowDirectory,
    S: ExecutionStore,
{
    let workflow = match directory.get(request.workflow_id).await {
        Ok(workflow) => workflow,
        Err(e) => {
            let fault = EngineError::WorkflowUnavailable {
                workflow_id: request.workflow_id,
                reason: e.to_string(),
            };
            error!(
                execution_id = %request.execution_id,
                workflow_id = %request.workflow_id,
                error = %fault,
                "workflow could not be loaded"
            );
            if let Err(store_err) = store
                .finalize(
                    request.execution_id,
                    Disposition::Failed {
                        error: fault.to_string(),
                    },
                )
                .await
            {
                error!(
                    execution_id = %request.execution_id,
                    error = %store_err,
                    "failed to record unloadable workflow"
                );
            }
            return;
        }
    };

    if let Err(e) = executor
        .execute(request.execution_id, &workflow, &request.context)
        .await
    {
        error!(
            execution_id = %request.execution_id,
            workflow_id = %request.workflow_id,
            error = %e,
            "execution aborted"
        );
    }
}
