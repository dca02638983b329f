//! Step dispatcher and continuation handler.
//!
//! `dispatch` executes a run's current step and decides a [`Transition`].
//! `continue_after_wait` moves a suspended run past its wait step. Both are
//! invoked through the scheduler, re-check the run status first, and write
//! the run back exactly once before submitting the next job.
//!
//! Neither ever returns an error to the scheduler. A failing step, a missing
//! definition or an unexpected store error during execution all end as a
//! failed run with the cause recorded in collected data and the audit log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::result_ext::ResultExt;
use crate::scheduler::{Job, JobHandler, Scheduler};
use crate::steps::{StepError, StepRegistry};
use crate::store::{AuditEntry, ConversationRepository, Repositories};
use crate::workflow::{CompletionSource, RunStatus, WorkflowDefinition, WorkflowRun};

/// Outcome of dispatching one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Move to this step and dispatch again.
    Continue(String),
    /// Stay on the wait step until the continuation fires.
    Suspend(DateTime<Utc>),
    /// No step left.
    Complete,
    /// The run cannot proceed.
    Fail(String),
}

/// Failure details recorded into collected data.
#[derive(Debug, Clone)]
struct Failure {
    reason: String,
    step_id: String,
}

pub struct StepDispatcher {
    repos: Repositories,
    registry: Arc<StepRegistry>,
    scheduler: Arc<dyn Scheduler>,
}

impl StepDispatcher {
    pub fn new(
        repos: Repositories,
        registry: Arc<StepRegistry>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            repos,
            registry,
            scheduler,
        }
    }

    /// Execute the run's current step. Returns `None` when nothing happened
    /// (unknown run, run not active, the run could not be loaded, or the
    /// transition could not be persisted).
    pub async fn dispatch(&self, run_id: Uuid) -> Option<Transition> {
        let mut run = match self.repos.runs.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                debug!(run_id = %run_id, "Dispatch for unknown run ignored");
                return None;
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to load run for dispatch");
                return None;
            }
        };

        if run.status != RunStatus::Active {
            debug!(run_id = %run_id, status = %run.status, "Dispatch for inactive run ignored");
            return None;
        }

        let step_id = run.current_step_id.clone();
        let (transition, failure) = match self.execute_current(&mut run).await {
            Ok(Ok(transition)) => (transition, None),
            Ok(Err(failure)) => (Transition::Fail(failure.reason.clone()), Some(failure)),
            Err(e) => {
                let failure = Failure {
                    reason: format!("Unexpected error: {}", e),
                    step_id: step_id.clone(),
                };
                (Transition::Fail(failure.reason.clone()), Some(failure))
            }
        };

        debug!(run_id = %run_id, step_id = %step_id, transition = ?transition, "Step dispatched");

        if let Err(e) = self.apply(&mut run, &transition, failure).await {
            error!(
                run_id = %run_id,
                step_id = %step_id,
                transition = ?transition,
                error = %e,
                "Failed to apply transition, transition lost"
            );
            return None;
        }
        Some(transition)
    }

    /// Resolve and run the current step. The outer error is unexpected
    /// (store failures); the inner one is a step failure.
    async fn execute_current(
        &self,
        run: &mut WorkflowRun,
    ) -> AppResult<Result<Transition, Failure>> {
        let step_id = run.current_step_id.clone();
        let fail = |reason: String| Failure {
            reason,
            step_id: step_id.clone(),
        };

        let Some(definition) = self.repos.definitions.get_definition(run.workflow_id).await?
        else {
            return Ok(Err(fail("workflow not found".to_string())));
        };

        let Some(step) = definition.step(&step_id) else {
            return Ok(Err(fail(format!("step {} not found in workflow", step_id))));
        };

        let config = match step.typed_config() {
            Ok(config) => config,
            Err(e) => return Ok(Err(fail(e.to_string()))),
        };

        let output = match self.registry.execute(run, &config).await {
            Ok(output) => output,
            Err(StepError::Store(e)) => return Err(e),
            Err(e) => {
                warn!(
                    run_id = %run.id,
                    step_id = %step.id,
                    step_type = %step.step_type,
                    error = %e,
                    "Step failed"
                );
                return Ok(Err(fail(e.to_string())));
            }
        };

        run.set_data(format!("step_{}_output", step.id), output.output.clone());
        self.audit(
            run.id,
            "workflow.step_executed",
            json!({
                "workflowId": run.workflow_id,
                "stepId": step.id,
                "stepType": step.step_type,
            }),
        )
        .await;

        info!(
            run_id = %run.id,
            workflow_id = %run.workflow_id,
            step_id = %step.id,
            step_type = %step.step_type,
            "Step executed"
        );

        if let Some(wake_at) = output.suspend_until {
            return Ok(Ok(Transition::Suspend(wake_at)));
        }

        let transition = match output.branch {
            Some(target) if definition.step(&target).is_some() => Transition::Continue(target),
            Some(target) => {
                return Ok(Err(fail(format!(
                    "branch target {} not found in workflow",
                    target
                ))))
            }
            None => next_in_order(&definition, &step.id),
        };
        Ok(Ok(transition))
    }

    /// Persist the transition, then submit follow-up work.
    async fn apply(
        &self,
        run: &mut WorkflowRun,
        transition: &Transition,
        failure: Option<Failure>,
    ) -> AppResult<()> {
        match transition {
            Transition::Continue(next) => {
                run.current_step_id = next.clone();
                self.repos.runs.update_run(run).await?;
                self.submit(Duration::ZERO, Job::Dispatch { run_id: run.id })
                    .await;
            }
            Transition::Suspend(wake_at) => {
                run.next_step_at = Some(*wake_at);
                self.repos.runs.update_run(run).await?;
                self.audit(
                    run.id,
                    "workflow.suspended",
                    json!({ "stepId": run.current_step_id, "nextStepAt": wake_at }),
                )
                .await;
                let delay = (*wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                self.submit(delay, Job::Continue { run_id: run.id }).await;
            }
            Transition::Complete => {
                run.complete(CompletionSource::Automation);
                self.repos.runs.update_run(run).await?;
                self.finish(run, "workflow.completed", json!({})).await;
            }
            Transition::Fail(reason) => {
                let step_id = failure
                    .map(|f| f.step_id)
                    .unwrap_or_else(|| run.current_step_id.clone());
                run.set_data("stepError", json!(reason));
                run.set_data("failedStepId", json!(step_id));
                run.fail(CompletionSource::Automation);
                self.repos.runs.update_run(run).await?;
                self.finish(
                    run,
                    "workflow.failed",
                    json!({ "stepId": step_id, "error": reason }),
                )
                .await;
            }
        }
        Ok(())
    }

    /// Resume a run suspended on a wait step.
    pub async fn continue_after_wait(&self, run_id: Uuid) -> Option<Transition> {
        match self.try_continue(run_id).await {
            Ok(transition) => transition,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Continuation failed");
                None
            }
        }
    }

    async fn try_continue(&self, run_id: Uuid) -> AppResult<Option<Transition>> {
        let Some(mut run) = self.repos.runs.get_run(run_id).await? else {
            debug!(run_id = %run_id, "Continuation for unknown run ignored");
            return Ok(None);
        };

        if run.status != RunStatus::Active {
            debug!(run_id = %run_id, status = %run.status, "Continuation for inactive run ignored");
            return Ok(None);
        }

        let Some(wake_at) = run.next_step_at else {
            debug!(run_id = %run_id, "Run is not waiting, duplicate continuation ignored");
            return Ok(None);
        };
        if Utc::now() < wake_at {
            warn!(run_id = %run_id, next_step_at = %wake_at, "Continuation delivered early");
        }

        let Some(definition) = self.repos.definitions.get_definition(run.workflow_id).await?
        else {
            let transition = Transition::Fail("workflow not found".to_string());
            self.apply(&mut run, &transition, None).await?;
            return Ok(Some(transition));
        };

        run.next_step_at = None;
        if definition.step(&run.current_step_id).is_none() {
            let transition =
                Transition::Fail(format!("step {} not found in workflow", run.current_step_id));
            self.apply(&mut run, &transition, None).await?;
            return Ok(Some(transition));
        }

        let transition = next_in_order(&definition, &run.current_step_id);
        match &transition {
            Transition::Continue(next) => {
                info!(run_id = %run_id, step_id = %next, "Wait elapsed, advancing");
                self.audit(
                    run.id,
                    "workflow.wait_elapsed",
                    json!({ "fromStepId": run.current_step_id, "toStepId": next }),
                )
                .await;
            }
            _ => info!(run_id = %run_id, "Wait elapsed on last step"),
        }
        self.apply(&mut run, &transition, None).await?;
        Ok(Some(transition))
    }

    /// Audit a terminal run and release its conversation.
    async fn finish(&self, run: &WorkflowRun, action: &str, details: serde_json::Value) {
        info!(run_id = %run.id, status = %run.status, "Run finished");
        self.audit(run.id, action, details).await;
        release_conversation(self.repos.conversations.as_ref(), run).await;
    }

    async fn submit(&self, delay: Duration, job: Job) {
        let _ = self
            .scheduler
            .schedule(delay, job)
            .await
            .log(format!("scheduling {} for run {}", job.kind(), job.run_id()));
    }

    async fn audit(&self, run_id: Uuid, action: &str, details: serde_json::Value) {
        let entry = AuditEntry::for_run(run_id, action, details);
        let _ = self.repos.audit.record(&entry).await.log("writing audit entry");
    }
}

#[async_trait]
impl JobHandler for StepDispatcher {
    async fn handle(&self, job: Job) {
        match job {
            Job::Dispatch { run_id } => {
                self.dispatch(run_id).await;
            }
            Job::Continue { run_id } => {
                self.continue_after_wait(run_id).await;
            }
        }
    }
}

fn next_in_order(definition: &WorkflowDefinition, step_id: &str) -> Transition {
    match definition.next_step_after(step_id) {
        Some(next) => Transition::Continue(next.id.clone()),
        None => Transition::Complete,
    }
}

/// Reset a conversation's workflow indicator if it names this run.
pub(crate) async fn release_conversation(
    conversations: &dyn ConversationRepository,
    run: &WorkflowRun,
) {
    if !run.is_conversation() {
        return;
    }
    match conversations
        .clear_workflow_active(&run.context_id, run.id)
        .await
    {
        Ok(true) => debug!(run_id = %run.id, conversation_id = %run.context_id, "Conversation released"),
        Ok(false) => {}
        Err(e) => warn!(run_id = %run.id, error = %e, "Failed to release conversation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RecordingScheduler;
    use crate::steps::create_default_registry;
    use crate::store::{MemoryStore, RunStore};
    use crate::workflow::{ContextType, Step, StepType, TriggerType};
    use serde_json::Value;

    struct Harness {
        store: Arc<MemoryStore>,
        scheduler: Arc<RecordingScheduler>,
        dispatcher: StepDispatcher,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::in_memory(store.clone());
        let scheduler = Arc::new(RecordingScheduler::new());
        let registry = Arc::new(create_default_registry(&repos));
        let dispatcher = StepDispatcher::new(repos, registry, scheduler.clone());
        Harness {
            store,
            scheduler,
            dispatcher,
        }
    }

    fn step(id: &str, step_type: StepType, order: i32, config: Value) -> Step {
        Step {
            id: id.to_string(),
            step_type,
            config,
            order,
        }
    }

    fn definition(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            trigger_type: TriggerType::Manual,
            trigger_config: Value::Null,
            steps,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seed(h: &Harness, def: &WorkflowDefinition) -> WorkflowRun {
        use crate::store::DefinitionStore;
        h.store.save_definition(def).await.unwrap();
        let first = def.first_step().unwrap().id.clone();
        let run = WorkflowRun::new(def.id, ContextType::Contact, "c1", first, Default::default());
        h.store.insert_run(&run).await.unwrap();
        run
    }

    #[tokio::test]
    async fn test_paused_run_is_untouched() {
        let h = harness();
        let def = definition(vec![step("a", StepType::AiAction, 0, json!({}))]);
        let mut run = seed(&h, &def).await;
        run.status = RunStatus::Paused;
        h.store.update_run(&run).await.unwrap();

        assert!(h.dispatcher.dispatch(run.id).await.is_none());
        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after, run);
        assert!(h.scheduler.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_workflow_fails_run() {
        let h = harness();
        let run = WorkflowRun::new(Uuid::new_v4(), ContextType::Contact, "c1", "a", Default::default());
        h.store.insert_run(&run).await.unwrap();

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        assert_eq!(transition, Transition::Fail("workflow not found".to_string()));

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Failed);
        assert_eq!(after.collected_data["stepError"], "workflow not found");
        assert_eq!(after.collected_data["failedStepId"], "a");
        assert!(after.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_step_failure_records_error_and_stops() {
        let h = harness();
        let def = definition(vec![
            step("a", StepType::SendMessage, 0, json!({"content": "Hi"})),
            step("b", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        assert!(matches!(transition, Transition::Fail(_)));

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Failed);
        assert_eq!(after.current_step_id, "a");
        assert!(after.collected_data["stepError"]
            .as_str()
            .unwrap()
            .contains("no conversation"));
        assert!(h.scheduler.pending().await.is_empty());
        assert!(h
            .store
            .audit_actions_for(run.id)
            .await
            .contains(&"workflow.failed".to_string()));
    }

    #[tokio::test]
    async fn test_success_stores_output_and_chains() {
        let h = harness();
        let def = definition(vec![
            step("a", StepType::AiAction, 0, json!({"action": "tag"})),
            step("b", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        assert_eq!(transition, Transition::Continue("b".to_string()));

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.current_step_id, "b");
        assert_eq!(after.collected_data["step_a_output"]["action"], "tag");

        let pending = h.scheduler.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job, Job::Dispatch { run_id: run.id });
        assert!(pending[0].delay.is_zero());
    }

    #[tokio::test]
    async fn test_wait_suspends_without_redispatch() {
        let h = harness();
        let def = definition(vec![
            step("b", StepType::Wait, 0, json!({"duration": 1, "unit": "hours"})),
            step("c", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        assert!(matches!(transition, Transition::Suspend(_)));

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Active);
        assert_eq!(after.current_step_id, "b");
        assert!(after.next_step_at.is_some());

        let pending = h.scheduler.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job, Job::Continue { run_id: run.id });
        assert!(pending[0].delay > Duration::from_secs(3590));

        let transition = h.dispatcher.continue_after_wait(run.id).await.unwrap();
        assert_eq!(transition, Transition::Continue("c".to_string()));
        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.current_step_id, "c");
        assert!(after.next_step_at.is_none());

        // Second delivery of the same continuation.
        assert!(h.dispatcher.continue_after_wait(run.id).await.is_none());
    }

    #[tokio::test]
    async fn test_continuation_on_last_wait_completes() {
        let h = harness();
        let def = definition(vec![step("w", StepType::Wait, 0, json!({"duration": 5, "unit": "minutes"}))]);
        let run = seed(&h, &def).await;

        h.dispatcher.dispatch(run.id).await;
        let transition = h.dispatcher.continue_after_wait(run.id).await.unwrap();
        assert_eq!(transition, Transition::Complete);

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Completed);
        assert_eq!(after.completed_by, Some(CompletionSource::Automation));
        assert!(after.next_step_at.is_none());
    }

    #[tokio::test]
    async fn test_dangling_branch_target_fails() {
        let h = harness();
        let def = definition(vec![
            step(
                "cond",
                StepType::Condition,
                0,
                json!({"field": "x", "operator": "exists", "trueStepId": "gone", "falseStepId": "gone"}),
            ),
            step("next", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        match transition {
            Transition::Fail(reason) => assert!(reason.contains("gone")),
            other => panic!("unexpected transition: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_wait_fails_run() {
        let h = harness();
        // Stored directly, as a definition written before the horizon check.
        let def = definition(vec![step(
            "w",
            StepType::Wait,
            0,
            json!({"duration": 1e12, "unit": "days"}),
        )]);
        let run = seed(&h, &def).await;

        let transition = h.dispatcher.dispatch(run.id).await.unwrap();
        assert!(matches!(transition, Transition::Fail(_)));

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Failed);
        assert!(after.next_step_at.is_none());
        assert!(h.scheduler.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_continuation_on_removed_step_fails() {
        use crate::store::DefinitionStore;

        let h = harness();
        let mut def = definition(vec![
            step("w", StepType::Wait, 0, json!({"duration": 1, "unit": "hours"})),
            step("after", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;
        h.dispatcher.dispatch(run.id).await;

        def.steps.retain(|s| s.id != "w");
        h.store.save_definition(&def).await.unwrap();

        let transition = h.dispatcher.continue_after_wait(run.id).await.unwrap();
        assert_eq!(
            transition,
            Transition::Fail("step w not found in workflow".to_string())
        );

        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Failed);
        assert_eq!(after.collected_data["failedStepId"], "w");
        assert!(!after.collected_data.contains_key("step_after_output"));
    }

    /// Run store whose writes are always rejected.
    struct RejectingWrites(Arc<MemoryStore>);

    #[async_trait]
    impl RunStore for RejectingWrites {
        async fn get_run(&self, id: Uuid) -> AppResult<Option<WorkflowRun>> {
            self.0.get_run(id).await
        }

        async fn find_active_run(
            &self,
            workflow_id: Uuid,
            context_type: ContextType,
            context_id: &str,
        ) -> AppResult<Option<WorkflowRun>> {
            self.0.find_active_run(workflow_id, context_type, context_id).await
        }

        async fn insert_run(&self, run: &WorkflowRun) -> AppResult<()> {
            self.0.insert_run(run).await
        }

        async fn update_run(&self, run: &WorkflowRun) -> AppResult<()> {
            Err(crate::error::AppError::Conflict(format!("run {} is contended", run.id)))
        }

        async fn list_runs(&self, filter: &crate::store::RunFilter) -> AppResult<Vec<WorkflowRun>> {
            self.0.list_runs(filter).await
        }
    }

    #[tokio::test]
    async fn test_unpersisted_transition_is_not_reported() {
        let h = harness();
        let def = definition(vec![
            step("a", StepType::AiAction, 0, json!({})),
            step("b", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;

        let mut repos = Repositories::in_memory(h.store.clone());
        repos.runs = Arc::new(RejectingWrites(h.store.clone()));
        let registry = Arc::new(create_default_registry(&repos));
        let dispatcher = StepDispatcher::new(repos, registry, h.scheduler.clone());

        assert!(dispatcher.dispatch(run.id).await.is_none());
        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.current_step_id, "a");
        assert!(h.scheduler.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_failure_keeps_committed_state() {
        let h = harness();
        let def = definition(vec![
            step("a", StepType::AiAction, 0, json!({})),
            step("b", StepType::AiAction, 1, json!({})),
        ]);
        let run = seed(&h, &def).await;
        h.scheduler.close().await;

        h.dispatcher.dispatch(run.id).await;
        let after = h.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Active);
        assert_eq!(after.current_step_id, "b");
    }
}
