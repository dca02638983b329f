//! `ai_action`: placeholder that records the requested action in the audit
//! log. No model is called.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::store::{AuditEntry, AuditLog};
use crate::workflow::{StepConfig, StepType, WorkflowRun};

use super::{mismatched, StepError, StepExecutor, StepOutput};

pub struct AiActionExecutor {
    audit: Arc<dyn AuditLog>,
}

impl AiActionExecutor {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl StepExecutor for AiActionExecutor {
    fn step_type(&self) -> StepType {
        StepType::AiAction
    }

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::AiAction(config) = config else {
            return Err(mismatched(StepType::AiAction, config));
        };
        let action = config.action.as_deref().unwrap_or("unspecified");

        let entry = AuditEntry::for_run(
            run.id,
            "workflow.ai_action",
            json!({
                "action": action,
                "prompt": config.prompt,
                "options": config.extra,
                "contextType": run.context_type,
                "contextId": run.context_id,
            }),
        );
        self.audit.record(&entry).await?;

        Ok(StepOutput::new(json!({
            "action": action,
            "status": "simulated",
        })))
    }
}
