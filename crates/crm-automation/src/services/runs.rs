//! Run lifecycle operations.
//!
//! Every operation validates the run's current status and returns
//! `AppError::Validation` for bad input, including an unknown run id.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::engine::dispatcher::release_conversation;
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;
use crate::scheduler::{Job, Scheduler};
use crate::store::{AuditEntry, Repositories, RunFilter};
use crate::workflow::{CompletionSource, ContextType, RunStatus, WorkflowRun};

/// Input to [`RunController::start`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRun {
    pub workflow_id: Uuid,
    pub context_type: ContextType,
    pub context_id: String,
    #[serde(default)]
    pub initial_data: Map<String, Value>,
}

/// Public run operations.
#[derive(Clone)]
pub struct RunController {
    repos: Repositories,
    scheduler: Arc<dyn Scheduler>,
}

impl RunController {
    pub fn new(repos: Repositories, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { repos, scheduler }
    }

    /// Create a run at the definition's first step and dispatch it.
    pub async fn start(&self, request: StartRun) -> AppResult<WorkflowRun> {
        let definition = self
            .repos
            .definitions
            .get_definition(request.workflow_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("Workflow '{}' not found", request.workflow_id))
            })?;

        if !definition.is_active {
            return Err(AppError::Validation(format!(
                "Workflow '{}' is not active",
                definition.name
            )));
        }

        let first_step = definition.first_step().ok_or_else(|| {
            AppError::Validation(format!("Workflow '{}' has no steps", definition.name))
        })?;

        if let Some(existing) = self
            .repos
            .runs
            .find_active_run(definition.id, request.context_type, &request.context_id)
            .await?
        {
            return Err(AppError::Validation(format!(
                "Workflow '{}' already has an active run {} for {} {}",
                definition.name, existing.id, request.context_type, request.context_id
            )));
        }

        let run = WorkflowRun::new(
            definition.id,
            request.context_type,
            request.context_id,
            first_step.id.clone(),
            request.initial_data,
        );
        self.repos.runs.insert_run(&run).await?;

        tracing::info!(
            run_id = %run.id,
            workflow_id = %definition.id,
            context_type = %run.context_type,
            context_id = %run.context_id,
            step_id = %run.current_step_id,
            "Run started"
        );
        self.audit(&run, "workflow.started", json!({ "workflowId": definition.id }))
            .await;
        self.dispatch(run.id).await;

        Ok(run)
    }

    pub async fn pause(&self, run_id: Uuid) -> AppResult<WorkflowRun> {
        let mut run = self.load(run_id).await?;
        if run.status != RunStatus::Active {
            return Err(AppError::Validation(format!(
                "Run {} is {}, only active runs can be paused",
                run_id, run.status
            )));
        }

        run.status = RunStatus::Paused;
        self.repos.runs.update_run(&run).await?;

        tracing::info!(run_id = %run_id, "Run paused");
        self.audit(&run, "workflow.paused", json!({ "stepId": run.current_step_id }))
            .await;
        Ok(run)
    }

    /// Reactivate a paused run and dispatch its current step again.
    pub async fn resume(&self, run_id: Uuid) -> AppResult<WorkflowRun> {
        let mut run = self.load(run_id).await?;
        if run.status != RunStatus::Paused {
            return Err(AppError::Validation(format!(
                "Run {} is {}, only paused runs can be resumed",
                run_id, run.status
            )));
        }

        if let Some(other) = self
            .repos
            .runs
            .find_active_run(run.workflow_id, run.context_type, &run.context_id)
            .await?
        {
            return Err(AppError::Validation(format!(
                "Run {} cannot resume, run {} is already active for {} {}",
                run_id, other.id, run.context_type, run.context_id
            )));
        }

        run.status = RunStatus::Active;
        self.repos.runs.update_run(&run).await?;

        tracing::info!(run_id = %run_id, step_id = %run.current_step_id, "Run resumed");
        self.audit(&run, "workflow.resumed", json!({ "stepId": run.current_step_id }))
            .await;
        self.dispatch(run.id).await;
        Ok(run)
    }

    pub async fn cancel(&self, run_id: Uuid, reason: Option<String>) -> AppResult<WorkflowRun> {
        let mut run = self.load(run_id).await?;
        if run.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "Run {} is already {}",
                run_id, run.status
            )));
        }

        let reason = reason.unwrap_or_else(|| "Cancelled".to_string());
        run.set_data("cancelReason", json!(reason));
        run.fail(CompletionSource::Cancellation);
        self.repos.runs.update_run(&run).await?;

        tracing::info!(run_id = %run_id, reason = %reason, "Run cancelled");
        self.audit(&run, "workflow.cancelled", json!({ "reason": reason }))
            .await;
        release_conversation(self.repos.conversations.as_ref(), &run).await;
        Ok(run)
    }

    /// Skip the current step without executing it.
    ///
    /// On the last step the run completes. Otherwise the pointer moves to the
    /// next step by order, which is dispatched if the run is active.
    pub async fn advance(
        &self,
        run_id: Uuid,
        provided_data: Option<Map<String, Value>>,
    ) -> AppResult<WorkflowRun> {
        let mut run = self.load(run_id).await?;
        if run.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "Run {} is already {}",
                run_id, run.status
            )));
        }

        let definition = self
            .repos
            .definitions
            .get_definition(run.workflow_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("Workflow '{}' not found", run.workflow_id))
            })?;

        if definition.step(&run.current_step_id).is_none() {
            return Err(AppError::Validation(format!(
                "Run {} is on step {} which no longer exists in workflow '{}'",
                run_id, run.current_step_id, definition.name
            )));
        }

        if let Some(data) = provided_data {
            run.merge_data(data);
        }
        run.next_step_at = None;

        let from = run.current_step_id.clone();
        match definition.next_step_after(&from) {
            Some(next) => {
                run.current_step_id = next.id.clone();
                self.repos.runs.update_run(&run).await?;

                tracing::info!(run_id = %run_id, from = %from, to = %next.id, "Run advanced");
                self.audit(
                    &run,
                    "workflow.advanced",
                    json!({ "fromStepId": from, "toStepId": next.id }),
                )
                .await;
                if run.status == RunStatus::Active {
                    self.dispatch(run.id).await;
                }
            }
            None => {
                run.complete(CompletionSource::ManualAdvance);
                self.repos.runs.update_run(&run).await?;

                tracing::info!(run_id = %run_id, from = %from, "Run completed by advance");
                self.audit(&run, "workflow.completed", json!({ "fromStepId": from }))
                    .await;
                release_conversation(self.repos.conversations.as_ref(), &run).await;
            }
        }
        Ok(run)
    }

    pub async fn get(&self, run_id: Uuid) -> AppResult<Option<WorkflowRun>> {
        self.repos.runs.get_run(run_id).await
    }

    pub async fn list(&self, filter: &RunFilter) -> AppResult<Vec<WorkflowRun>> {
        self.repos.runs.list_runs(filter).await
    }

    async fn load(&self, run_id: Uuid) -> AppResult<WorkflowRun> {
        self.repos
            .runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Run {} not found", run_id)))
    }

    async fn dispatch(&self, run_id: Uuid) {
        let _ = self
            .scheduler
            .schedule(Duration::ZERO, Job::Dispatch { run_id })
            .await
            .log(format!("scheduling dispatch for run {}", run_id));
    }

    async fn audit(&self, run: &WorkflowRun, action: &str, details: Value) {
        let entry = AuditEntry::for_run(run.id, action, details);
        let _ = self.repos.audit.record(&entry).await.log("writing audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RecordingScheduler;
    use crate::store::{Conversation, ConversationRepository, ConversationStatus, DefinitionStore, MemoryStore};
    use crate::workflow::{Step, StepType, TriggerType, WorkflowDefinition};
    use chrono::Utc;

    struct Harness {
        store: Arc<MemoryStore>,
        scheduler: Arc<RecordingScheduler>,
        controller: RunController,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let controller = RunController::new(Repositories::in_memory(store.clone()), scheduler.clone());
        Harness {
            store,
            scheduler,
            controller,
        }
    }

    async fn workflow(h: &Harness, step_ids: &[&str]) -> WorkflowDefinition {
        let def = WorkflowDefinition {
            id: Uuid::new_v4(),
            name: "Follow up".to_string(),
            trigger_type: TriggerType::Manual,
            trigger_config: Value::Null,
            steps: step_ids
                .iter()
                .enumerate()
                .map(|(i, id)| Step {
                    id: id.to_string(),
                    step_type: StepType::AiAction,
                    config: json!({}),
                    order: i as i32,
                })
                .collect(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        h.store.save_definition(&def).await.unwrap();
        def
    }

    fn start(def: &WorkflowDefinition, context_type: ContextType, context_id: &str) -> StartRun {
        StartRun {
            workflow_id: def.id,
            context_type,
            context_id: context_id.to_string(),
            initial_data: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_start_positions_at_lowest_order_and_dispatches() {
        let h = harness();
        let mut def = workflow(&h, &["a", "b"]).await;
        def.steps.reverse();
        def.steps[0].order = 5;
        h.store.save_definition(&def).await.unwrap();

        let run = h.controller.start(start(&def, ContextType::Contact, "c1")).await.unwrap();
        assert_eq!(run.current_step_id, "a");
        assert_eq!(run.status, RunStatus::Active);

        let pending = h.scheduler.pending().await;
        assert_eq!(pending[0].job, Job::Dispatch { run_id: run.id });
    }

    #[tokio::test]
    async fn test_start_validation_errors() {
        let h = harness();
        let empty = workflow(&h, &[]).await;
        let err = h.controller.start(start(&empty, ContextType::Contact, "c1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut inactive = workflow(&h, &["a"]).await;
        inactive.is_active = false;
        h.store.save_definition(&inactive).await.unwrap();
        let err = h.controller.start(start(&inactive, ContextType::Contact, "c1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .controller
            .start(StartRun {
                workflow_id: Uuid::new_v4(),
                context_type: ContextType::Contact,
                context_id: "c1".to_string(),
                initial_data: Map::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let h = harness();
        let def = workflow(&h, &["a", "b"]).await;
        let run = h.controller.start(start(&def, ContextType::Contact, "c1")).await.unwrap();

        let paused = h.controller.pause(run.id).await.unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        assert!(matches!(h.controller.pause(run.id).await, Err(AppError::Validation(_))));

        let resumed = h.controller.resume(run.id).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Active);
        assert!(matches!(h.controller.resume(run.id).await, Err(AppError::Validation(_))));
        assert_eq!(h.scheduler.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_refused_when_triple_taken() {
        let h = harness();
        let def = workflow(&h, &["a"]).await;
        let first = h.controller.start(start(&def, ContextType::Deal, "d1")).await.unwrap();
        h.controller.pause(first.id).await.unwrap();
        h.controller.start(start(&def, ContextType::Deal, "d1")).await.unwrap();

        let err = h.controller.resume(first.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_records_reason() {
        let h = harness();
        let def = workflow(&h, &["a"]).await;
        let run = h.controller.start(start(&def, ContextType::Contact, "c1")).await.unwrap();

        let cancelled = h
            .controller
            .cancel(run.id, Some("customer replied".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, RunStatus::Failed);
        assert_eq!(cancelled.completed_by, Some(CompletionSource::Cancellation));
        assert_eq!(cancelled.collected_data["cancelReason"], "customer replied");
        assert!(cancelled.completed_at.is_some());

        let err = h.controller.cancel(run.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_releases_conversation() {
        let h = harness();
        h.store
            .upsert_conversation(Conversation {
                id: "v1".to_string(),
                contact_id: None,
                status: ConversationStatus::Open,
                active_workflow_run_id: None,
                ai_enabled: false,
                message_count: 1,
                last_message_preview: None,
                last_message_at: None,
            })
            .await;
        let def = workflow(&h, &["a"]).await;
        let run = h.controller.start(start(&def, ContextType::Conversation, "v1")).await.unwrap();
        h.store.mark_workflow_active("v1", run.id).await.unwrap();

        h.controller.cancel(run.id, None).await.unwrap();
        let conv = h.store.get_conversation("v1").await.unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Open);
        assert!(conv.active_workflow_run_id.is_none());
    }

    #[tokio::test]
    async fn test_advance_skips_and_completes() {
        let h = harness();
        let def = workflow(&h, &["a", "b"]).await;
        let run = h.controller.start(start(&def, ContextType::Contact, "c1")).await.unwrap();

        let mut data = Map::new();
        data.insert("approved".to_string(), json!(true));
        let advanced = h.controller.advance(run.id, Some(data)).await.unwrap();
        assert_eq!(advanced.current_step_id, "b");
        assert_eq!(advanced.collected_data["approved"], true);
        // Step "a" was skipped, not executed.
        assert!(advanced.collected_data.get("step_a_output").is_none());

        let done = h.controller.advance(run.id, None).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.completed_by, Some(CompletionSource::ManualAdvance));
    }

    #[tokio::test]
    async fn test_advance_from_removed_step_rejected() {
        let h = harness();
        let mut def = workflow(&h, &["a", "b"]).await;
        let run = h.controller.start(start(&def, ContextType::Contact, "c1")).await.unwrap();

        def.steps.retain(|s| s.id != "a");
        h.store.save_definition(&def).await.unwrap();

        let err = h.controller.advance(run.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("step a")));

        let after = h.controller.get(run.id).await.unwrap().unwrap();
        assert_eq!(after.status, RunStatus::Active);
        assert_eq!(after.current_step_id, "a");
    }

    #[tokio::test]
    async fn test_unknown_run_is_validation_error() {
        let h = harness();
        let err = h.controller.pause(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.controller.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
