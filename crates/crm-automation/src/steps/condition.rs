//! `condition`: branch on a value from collected data or the live context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::evaluator::{lookup_path, ConditionEvaluator};
use crate::engine::template::lookup_data;
use crate::store::ContextRepository;
use crate::workflow::{StepConfig, StepType, WorkflowRun};

use super::{mismatched, StepError, StepExecutor, StepOutput};

pub struct ConditionExecutor {
    contexts: Arc<dyn ContextRepository>,
    evaluator: ConditionEvaluator,
}

impl ConditionExecutor {
    pub fn new(contexts: Arc<dyn ContextRepository>) -> Self {
        Self {
            contexts,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// `context.` reads the live entity; anything else reads collected data.
    async fn resolve(&self, run: &WorkflowRun, field: &str) -> Result<Option<Value>, StepError> {
        match field.strip_prefix("context.") {
            Some(path) => {
                let entity = self
                    .contexts
                    .load_context(run.context_type, &run.context_id)
                    .await?;
                Ok(entity.and_then(|entity| lookup_path(&entity, path).cloned()))
            }
            None => Ok(lookup_data(&run.collected_data, field).cloned()),
        }
    }
}

#[async_trait]
impl StepExecutor for ConditionExecutor {
    fn step_type(&self) -> StepType {
        StepType::Condition
    }

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::Condition(condition) = config else {
            return Err(mismatched(StepType::Condition, config));
        };
        let (field, operator) = condition.validate()?;

        let actual = self.resolve(run, field).await?;
        let result = self
            .evaluator
            .compare(operator, actual.as_ref(), &condition.value);

        let branch = if result {
            condition.true_step_id.clone()
        } else {
            condition.false_step_id.clone()
        };

        tracing::debug!(
            run_id = %run.id,
            field = %field,
            operator = %operator,
            result,
            branch = ?branch,
            "Condition evaluated"
        );

        Ok(StepOutput::new(json!({
            "field": field,
            "operator": operator,
            "actual": actual,
            "result": result,
        }))
        .with_branch(branch))
    }
}
