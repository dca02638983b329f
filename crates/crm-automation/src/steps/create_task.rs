//! `create_task`: record a task activity for a person to follow up.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::engine::template;
use crate::store::{
    Activity, ActivityKind, ActivityRepository, ContactRepository, ConversationRepository,
    DealRepository,
};
use crate::workflow::{StepConfig, StepType, WorkflowRun};

use super::{activity_links, mismatched, resolve_owner_id, StepError, StepExecutor, StepOutput};

pub struct CreateTaskExecutor {
    contacts: Arc<dyn ContactRepository>,
    deals: Arc<dyn DealRepository>,
    conversations: Arc<dyn ConversationRepository>,
    activities: Arc<dyn ActivityRepository>,
}

impl CreateTaskExecutor {
    pub fn new(
        contacts: Arc<dyn ContactRepository>,
        deals: Arc<dyn DealRepository>,
        conversations: Arc<dyn ConversationRepository>,
        activities: Arc<dyn ActivityRepository>,
    ) -> Self {
        Self {
            contacts,
            deals,
            conversations,
            activities,
        }
    }
}

#[async_trait]
impl StepExecutor for CreateTaskExecutor {
    fn step_type(&self) -> StepType {
        StepType::CreateTask
    }

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::CreateTask(config) = config else {
            return Err(mismatched(StepType::CreateTask, config));
        };
        config.validate()?;

        let now = Utc::now();
        let due_at = config
            .due_in_days
            .map(|days| {
                TimeDelta::try_days(days)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| {
                        StepError::Configuration(format!("dueInDays {} is out of range", days))
                    })
            })
            .transpose()?;

        let explicit = config
            .assignee_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string);
        let assignee_id = match explicit {
            Some(id) => Some(id),
            None if config.assign_to_owner => {
                resolve_owner_id(
                    run,
                    self.contacts.as_ref(),
                    self.deals.as_ref(),
                    self.conversations.as_ref(),
                )
                .await?
            }
            None => None,
        };

        let subject = template::render(config.subject.as_deref().unwrap_or_default(), &run.collected_data)?;
        let body = config
            .description
            .as_deref()
            .map(|d| template::render(d, &run.collected_data))
            .transpose()?;
        let (contact_id, deal_id) =
            activity_links(run, self.deals.as_ref(), self.conversations.as_ref()).await?;

        let activity = Activity {
            id: Uuid::new_v4(),
            kind: ActivityKind::Task,
            subject: subject.clone(),
            body,
            contact_id,
            deal_id,
            assignee_id: assignee_id.clone(),
            due_at,
            priority: config.priority.clone(),
            metadata: json!({ "workflowRunId": run.id }),
            created_at: now,
        };
        self.activities.insert_activity(&activity).await?;

        tracing::debug!(run_id = %run.id, activity_id = %activity.id, "Workflow task created");

        Ok(StepOutput::new(json!({
            "activityId": activity.id,
            "subject": subject,
            "assigneeId": assignee_id,
            "dueAt": due_at,
        })))
    }
}
