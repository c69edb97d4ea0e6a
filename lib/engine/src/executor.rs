//! Action execution with per-action retry.
//!
//! The executor owns the run phase of an execution's lifecycle: condition
//! gate, concurrent action fan-out, retry with exponential backoff, and the
//! terminal store transition.

use crate::condition::evaluate;
use crate::context::ExecutionContext;
use crate::error::{EngineError, TemplateError};
use crate::handler::{HandlerError, HandlerRegistry};
use crate::record::{ActionOutcome, FaultKind};
use crate::store::{Disposition, ExecutionStore};
use crate::template::render_params;
use crate::workflow::Workflow;
use copper_relay_core::ExecutionId;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry schedule for transient action failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocation attempts per action, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base: Duration,
    /// Multiplier applied per subsequent attempt.
    pub factor: u32,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            factor: 2,
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given attempt number (1-based) fails.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base
            .saturating_mul(self.factor.saturating_pow(exponent))
            .min(self.cap)
    }
}

/// Runs a workflow's actions against an execution record.
pub struct ActionExecutor<S> {
    store: Arc<S>,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
}

impl<S: ExecutionStore> ActionExecutor<S> {
    /// Creates an executor with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            store,
            registry,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs an admitted execution to its terminal state.
    ///
    /// Evaluates the condition gate, then runs every action concurrently.
    /// Per-action failures are absorbed into outcomes; only store faults
    /// abort the execution, marking its record `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store rejects a lifecycle transition.
    pub async fn execute(
        &self,
        execution_id: ExecutionId,
        workflow: &Workflow,
        context: &ExecutionContext,
    ) -> Result<Vec<ActionOutcome>, EngineError> {
        self.store.mark_running(execution_id).await?;
        info!(
            execution_id = %execution_id,
            workflow_id = %workflow.id,
            actions = workflow.actions.len(),
            "execution started"
        );

        if !evaluate(workflow.condition.as_ref(), context) {
            info!(
                execution_id = %execution_id,
                workflow_id = %workflow.id,
                "condition not met, completing without actions"
            );
            self.store
                .finalize(execution_id, Disposition::Completed)
                .await?;
            return Ok(Vec::new());
        }

        let runs = workflow.actions.iter().enumerate().map(|(index, action)| {
            self.run_action(execution_id, index as u32, action, context)
        });
        let results = join_all(runs).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(execution_id = %execution_id, error = %e, "execution aborted");
                    if let Err(store_err) = self
                        .store
                        .finalize(
                            execution_id,
                            Disposition::Failed {
                                error: e.to_string(),
                            },
                        )
                        .await
                    {
                        warn!(
                            execution_id = %execution_id,
                            error = %store_err,
                            "failed to record aborted execution"
                        );
                    }
                    return Err(e);
                }
            }
        }

        self.store
            .finalize(execution_id, Disposition::Completed)
            .await?;
        outcomes.sort_by_key(|o| o.index);
        info!(
            execution_id = %execution_id,
            succeeded = outcomes.iter().filter(|o| o.result.is_success()).count(),
            total = outcomes.len(),
            "execution completed"
        );
        Ok(outcomes)
    }

    /// Runs one action and records its outcome. Only store faults escape.
    async fn run_action(
        &self,
        execution_id: ExecutionId,
        index: u32,
        action: &crate::action::ActionSpec,
        context: &ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let outcome = self.attempt_action(execution_id, index, action, context).await;
        self.store.push_outcome(execution_id, outcome.clone()).await?;
        Ok(outcome)
    }

    async fn attempt_action(
        &self,
        execution_id: ExecutionId,
        index: u32,
        action: &crate::action::ActionSpec,
        context: &ExecutionContext,
    ) -> ActionOutcome {
        let kind = action.kind();

        let rendered = match render_params(action.params(), context) {
            Ok(rendered) => rendered,
            Err(TemplateError::UnresolvedVariable { path }) => {
                warn!(
                    execution_id = %execution_id,
                    action = %kind,
                    path = %path,
                    "action skipped, template variable unresolved"
                );
                return ActionOutcome::unresolved(index, kind, path);
            }
        };

        let Some(handler) = self.registry.get(kind) else {
            return ActionOutcome::failed(
                index,
                kind,
                FaultKind::Permanent,
                format!("no handler registered for {kind}"),
                0,
            );
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = handler.invoke(&rendered);
            let result = match tokio::time::timeout(handler.call_timeout(), call).await {
                Ok(result) => result,
                Err(_) => Err(HandlerError::Transient {
                    message: "handler call timed out".to_string(),
                }),
            };

            match result {
                Ok(output) => return ActionOutcome::succeeded(index, kind, output),
                Err(error) => {
                    if error.is_transient() && attempt < self.retry.max_attempts {
                        let delay = self.retry.backoff_after(attempt);
                        warn!(
                            execution_id = %execution_id,
                            action = %kind,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "action attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let fault = if error.is_transient() {
                        FaultKind::Transient
                    } else {
                        FaultKind::Permanent
                    };
                    warn!(
                        execution_id = %execution_id,
                        action = %kind,
                        attempt,
                        error = %error,
                        "action failed"
                    );
                    return ActionOutcome::failed(index, kind, fault, error.to_string(), attempt);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ActionParams, ActionSpec};
    use crate::condition::{Condition, Operator};
    use crate::context::Namespace;
    use crate::event::{DomainEvent, TriggerSource};
    use crate::handler::ScriptedHandler;
    use crate::record::{ActionResult, ExecutionRecord, ExecutionState};
    use crate::store::MemoryExecutionStore;
    use crate::workflow::{TriggerConfig, TriggerKind};
    use copper_relay_core::{MessageId, UserId};
    use serde_json::json;

    fn sms_action(body: &str) -> ActionSpec {
        ActionSpec::new(
            ActionKind::SendSms,
            ActionParams::from([
                ("to".to_string(), "{{contact.phone}}".to_string()),
                ("body".to_string(), body.to_string()),
            ]),
        )
    }

    fn sms_context() -> ExecutionContext {
        ExecutionContext::builder()
            .field(Namespace::Contact, "name", json!("Ana"))
            .field(Namespace::Contact, "phone", json!("+15551230000"))
            .field(Namespace::Message, "source", json!("sms"))
            .build()
    }

    async fn admitted(
        store: &MemoryExecutionStore,
        workflow: &Workflow,
        context: ExecutionContext,
    ) -> ExecutionId {
        let event = DomainEvent::new(
            TriggerKind::MessageReceived,
            workflow.user_id,
            TriggerSource::Message(MessageId::new()),
            context,
        );
        let record = ExecutionRecord::for_event(workflow, &event);
        let id = record.id;
        store.admit(record).await.unwrap();
        id
    }

    #[tokio::test]
    async fn matching_condition_runs_actions_with_rendered_params() {
        let store = Arc::new(MemoryExecutionStore::new());
        let handler = Arc::new(ScriptedHandler::succeeding(json!({"sent": true})));
        let registry = Arc::new(
            HandlerRegistry::new().register(ActionKind::SendSms, handler.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(
            UserId::new(),
            "Auto-reply",
            TriggerConfig::MessageReceived,
        )
        .with_condition(Condition::Predicate {
            field: "message.source".to_string(),
            op: Operator::Equals,
            value: json!("sms"),
        })
        .with_action(sms_action("Hi {{contact.name}}!"));

        let context = sms_context();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_success());

        let invocations = handler.invocations();
        assert_eq!(invocations[0]["body"], "Hi Ana!");
        assert_eq!(invocations[0]["to"], "+15551230000");

        let record = store.get(id).await.unwrap();
        assert_eq!(record.state, ExecutionState::Completed);
        assert_eq!(record.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn unmet_condition_completes_with_no_outcomes() {
        let store = Arc::new(MemoryExecutionStore::new());
        let handler = Arc::new(ScriptedHandler::succeeding(json!(null)));
        let registry = Arc::new(
            HandlerRegistry::new().register(ActionKind::SendSms, handler.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(
            UserId::new(),
            "Email-only reply",
            TriggerConfig::MessageReceived,
        )
        .with_condition(Condition::Predicate {
            field: "message.source".to_string(),
            op: Operator::Equals,
            value: json!("email"),
        })
        .with_action(sms_action("should not send"));

        let context = sms_context();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        assert!(outcomes.is_empty());
        assert!(handler.invocations().is_empty());

        let record = store.get(id).await.unwrap();
        assert_eq!(record.state, ExecutionState::Completed);
        assert!(record.outcomes.is_empty());
    }

    #[tokio::test]
    async fn unresolved_variable_fails_action_without_invoking_handler() {
        let store = Arc::new(MemoryExecutionStore::new());
        let sms = Arc::new(ScriptedHandler::succeeding(json!(null)));
        let task = Arc::new(ScriptedHandler::succeeding(json!({"task": "t1"})));
        let registry = Arc::new(
            HandlerRegistry::new()
                .register(ActionKind::SendSms, sms.clone())
                .register(ActionKind::CreateTask, task.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(
            UserId::new(),
            "Mixed actions",
            TriggerConfig::MessageReceived,
        )
        .with_action(ActionSpec::new(
            ActionKind::SendSms,
            ActionParams::from([("to".to_string(), "{{contact.email}}".to_string())]),
        ))
        .with_action(ActionSpec::new(
            ActionKind::CreateTask,
            ActionParams::from([("title".to_string(), "Call {{contact.name}}".to_string())]),
        ));

        let context = sms_context();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].result,
            ActionResult::UnresolvedVariable {
                path: "contact.email".to_string()
            }
        );
        assert!(outcomes[1].result.is_success());

        // The failing action's handler was never called; the other ran.
        assert!(sms.invocations().is_empty());
        assert_eq!(task.invocations()[0]["title"], "Call Ana");

        let record = store.get(id).await.unwrap();
        assert_eq!(record.state, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn missing_handler_is_a_permanent_fault() {
        let store = Arc::new(MemoryExecutionStore::new());
        let executor = ActionExecutor::new(store.clone(), Arc::new(HandlerRegistry::new()));

        let workflow = Workflow::new(UserId::new(), "No handlers", TriggerConfig::MessageReceived)
            .with_action(ActionSpec::new(ActionKind::CallWebhook, ActionParams::new()));

        let context = ExecutionContext::default();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        match &outcomes[0].result {
            ActionResult::Failed {
                fault, attempts, ..
            } => {
                assert_eq!(*fault, FaultKind::Permanent);
                assert_eq!(*attempts, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_handler_failure_is_not_retried() {
        let store = Arc::new(MemoryExecutionStore::new());
        let handler = Arc::new(ScriptedHandler::failing(HandlerError::Permanent {
            message: "invalid recipient".to_string(),
        }));
        let registry = Arc::new(
            HandlerRegistry::new().register(ActionKind::SendEmail, handler.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(UserId::new(), "Email", TriggerConfig::ContactCreated)
            .with_action(ActionSpec::new(ActionKind::SendEmail, ActionParams::new()));

        let context = ExecutionContext::default();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        assert_eq!(handler.invocations().len(), 1);
        match &outcomes[0].result {
            ActionResult::Failed {
                fault, attempts, ..
            } => {
                assert_eq!(*fault, FaultKind::Permanent);
                assert_eq!(*attempts, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff_then_exhaust() {
        let store = Arc::new(MemoryExecutionStore::new());
        let handler = Arc::new(ScriptedHandler::failing(HandlerError::Transient {
            message: "gateway busy".to_string(),
        }));
        let registry = Arc::new(
            HandlerRegistry::new().register(ActionKind::SendSms, handler.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(UserId::new(), "Flaky", TriggerConfig::MessageReceived)
            .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new()));

        let context = ExecutionContext::default();
        let id = admitted(&store, &workflow, context.clone()).await;

        let started = tokio::time::Instant::now();
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        // Three attempts, with 1s and 2s backoffs in between.
        assert_eq!(handler.invocations().len(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        match &outcomes[0].result {
            ActionResult::Failed {
                fault, attempts, ..
            } => {
                assert_eq!(*fault, FaultKind::Transient);
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // The record completes even though its only action failed.
        let record = store.get(id).await.unwrap();
        assert_eq!(record.state, ExecutionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success_stops_retrying() {
        let store = Arc::new(MemoryExecutionStore::new());
        let handler = Arc::new(ScriptedHandler::succeeding(json!("ok")).with_script([
            Err(HandlerError::Transient {
                message: "gateway busy".to_string(),
            }),
        ]));
        let registry = Arc::new(
            HandlerRegistry::new().register(ActionKind::SendSms, handler.clone()),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(UserId::new(), "Retry once", TriggerConfig::MessageReceived)
            .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new()));

        let context = ExecutionContext::default();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        assert_eq!(handler.invocations().len(), 2);
        assert!(outcomes[0].result.is_success());
    }

    #[tokio::test]
    async fn concurrent_actions_report_in_authored_order() {
        let store = Arc::new(MemoryExecutionStore::new());
        let registry = Arc::new(
            HandlerRegistry::new()
                .register(
                    ActionKind::SendSms,
                    Arc::new(ScriptedHandler::succeeding(json!("sms"))),
                )
                .register(
                    ActionKind::SendEmail,
                    Arc::new(ScriptedHandler::succeeding(json!("email"))),
                )
                .register(
                    ActionKind::CreateTask,
                    Arc::new(ScriptedHandler::succeeding(json!("task"))),
                ),
        );
        let executor = ActionExecutor::new(store.clone(), registry);

        let workflow = Workflow::new(UserId::new(), "Fan-out", TriggerConfig::ContactCreated)
            .with_action(ActionSpec::new(ActionKind::SendSms, ActionParams::new()))
            .with_action(ActionSpec::new(ActionKind::SendEmail, ActionParams::new()))
            .with_action(ActionSpec::new(ActionKind::CreateTask, ActionParams::new()));

        let context = ExecutionContext::default();
        let id = admitted(&store, &workflow, context.clone()).await;
        let outcomes = executor.execute(id, &workflow, &context).await.unwrap();

        let kinds: Vec<ActionKind> = outcomes.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::SendSms, ActionKind::SendEmail, ActionKind::CreateTask]
        );
        assert!(outcomes.iter().all(|o| o.result.is_success()));
    }

    #[test]
    fn backoff_schedule_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(6), Duration::from_secs(30));
        assert_eq!(policy.backoff_after(60), Duration::from_secs(30));
    }
}
