//! `send_email`: record an email activity. Nothing is delivered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::engine::template;
use crate::store::{
    Activity, ActivityKind, ActivityRepository, ContactRepository, ConversationRepository,
    DealRepository,
};
use crate::workflow::{StepConfig, StepType, WorkflowRun};

use super::{activity_links, mismatched, resolve_contact_id, StepError, StepExecutor, StepOutput};

pub struct SendEmailExecutor {
    contacts: Arc<dyn ContactRepository>,
    deals: Arc<dyn DealRepository>,
    conversations: Arc<dyn ConversationRepository>,
    activities: Arc<dyn ActivityRepository>,
}

impl SendEmailExecutor {
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

    async fn contact_email(&self, run: &WorkflowRun) -> Result<Option<String>, StepError> {
        let Some(contact_id) =
            resolve_contact_id(run, self.deals.as_ref(), self.conversations.as_ref()).await?
        else {
            return Ok(None);
        };
        Ok(self
            .contacts
            .get_contact(&contact_id)
            .await?
            .and_then(|contact| contact.email)
            .filter(|email| !email.trim().is_empty()))
    }
}

#[async_trait]
impl StepExecutor for SendEmailExecutor {
    fn step_type(&self) -> StepType {
        StepType::SendEmail
    }

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::SendEmail(config) = config else {
            return Err(mismatched(StepType::SendEmail, config));
        };
        config.validate()?;

        let explicit = config
            .to
            .as_deref()
            .map(str::trim)
            .filter(|to| !to.is_empty())
            .map(str::to_string);
        let to = match explicit {
            Some(to) => Some(to),
            None if config.use_contact_email => self.contact_email(run).await?,
            None => None,
        };
        let to = to.ok_or_else(|| {
            StepError::MissingTarget(format!(
                "no email recipient for {} {}",
                run.context_type, run.context_id
            ))
        })?;

        let subject = template::render(config.subject.as_deref().unwrap_or_default(), &run.collected_data)?;
        let body = template::render(config.body.as_deref().unwrap_or_default(), &run.collected_data)?;
        let (contact_id, deal_id) =
            activity_links(run, self.deals.as_ref(), self.conversations.as_ref()).await?;

        let activity = Activity {
            id: Uuid::new_v4(),
            kind: ActivityKind::Email,
            subject: subject.clone(),
            body: Some(body),
            contact_id,
            deal_id,
            assignee_id: None,
            due_at: None,
            priority: None,
            metadata: json!({
                "to": to,
                "workflowRunId": run.id,
                "delivery": "recorded",
            }),
            created_at: Utc::now(),
        };
        self.activities.insert_activity(&activity).await?;

        tracing::debug!(run_id = %run.id, activity_id = %activity.id, to = %to, "Workflow email recorded");

        Ok(StepOutput::new(json!({
            "activityId": activity.id,
            "to": to,
            "subject": subject,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Contact, Deal, MemoryStore};
    use crate::workflow::ContextType;
    use serde_json::Value;

    fn executor(store: &Arc<MemoryStore>) -> SendEmailExecutor {
        SendEmailExecutor::new(store.clone(), store.clone(), store.clone(), store.clone())
    }

    fn config(raw: Value) -> StepConfig {
        StepConfig::parse(StepType::SendEmail, &raw).unwrap()
    }

    fn contact(id: &str, email: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            name: "Sam".to_string(),
            email: email.map(str::to_string),
            owner_id: None,
            source: None,
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_explicit_recipient() {
        let store = Arc::new(MemoryStore::new());
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), json!("Sam"));
        let run = WorkflowRun::new(Uuid::new_v4(), ContextType::Contact, "c1", "a", data);

        let output = executor(&store)
            .execute(
                &run,
                &config(json!({"to": "ops@example.com", "subject": "Hi {{name}}", "body": "Welcome"})),
            )
            .await
            .unwrap();
        assert_eq!(output.output["to"], "ops@example.com");

        let activities = store.activities().await;
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityKind::Email);
        assert_eq!(activities[0].subject, "Hi Sam");
        assert_eq!(activities[0].contact_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_deal_primary_contact_email() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_contact(contact("c2", Some("buyer@example.com"))).await;
        store
            .upsert_deal(Deal {
                id: "d1".to_string(),
                title: "Renewal".to_string(),
                pipeline_id: "p1".to_string(),
                stage_id: "s1".to_string(),
                primary_contact_id: Some("c2".to_string()),
                owner_id: None,
                amount: Some(900.0),
            })
            .await;
        let run = WorkflowRun::new(Uuid::new_v4(), ContextType::Deal, "d1", "a", Default::default());

        executor(&store)
            .execute(
                &run,
                &config(json!({"useContactEmail": true, "subject": "Quote", "body": "Attached"})),
            )
            .await
            .unwrap();

        let activity = &store.activities().await[0];
        assert_eq!(activity.metadata["to"], "buyer@example.com");
        assert_eq!(activity.deal_id.as_deref(), Some("d1"));
        assert_eq!(activity.contact_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_fails_without_recipient() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_contact(contact("c1", None)).await;
        let run = WorkflowRun::new(Uuid::new_v4(), ContextType::Contact, "c1", "a", Default::default());

        let err = executor(&store)
            .execute(
                &run,
                &config(json!({"useContactEmail": true, "subject": "Hi", "body": "there"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::MissingTarget(_)));

        let err = executor(&store)
            .execute(&run, &config(json!({"subject": "Hi", "body": "there"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::MissingTarget(_)));
        assert!(store.activities().await.is_empty());
    }
}
