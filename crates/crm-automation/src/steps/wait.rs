//! `wait`: suspend the run for a fixed delay.
//!
//! The executor only computes the wake time. The dispatcher persists it and
//! schedules the continuation once the run is written back.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;

use crate::workflow::{StepConfig, StepType, WorkflowRun};

use super::{mismatched, StepError, StepExecutor, StepOutput};

#[derive(Debug, Clone, Copy, Default)]
pub struct WaitExecutor;

#[async_trait]
impl StepExecutor for WaitExecutor {
    fn step_type(&self) -> StepType {
        StepType::Wait
    }

    async fn execute(
        &self,
        _run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::Wait(config) = config else {
            return Err(mismatched(StepType::Wait, config));
        };

        let delay_ms = config.delay_ms();
        let wake_at = TimeDelta::try_milliseconds(delay_ms)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| {
                StepError::Configuration(format!("wait of {} ms is out of range", delay_ms))
            })?;

        Ok(StepOutput::new(json!({
            "delayMs": delay_ms,
            "resumeAt": wake_at,
        }))
        .suspend_until(wake_at))
    }
}
