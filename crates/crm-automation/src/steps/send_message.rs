//! `send_message`: post an outbound message into a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::engine::template;
use crate::store::{
    Conversation, ConversationRepository, DealRepository, Message, MessageDirection,
    MessageRepository, TemplateRepository,
};
use crate::workflow::{ContextType, StepConfig, StepType, WorkflowRun};

use super::{mismatched, StepError, StepExecutor, StepOutput};

/// Characters kept in the conversation's last-message preview.
pub const PREVIEW_LEN: usize = 100;

pub struct SendMessageExecutor {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    templates: Arc<dyn TemplateRepository>,
    deals: Arc<dyn DealRepository>,
}

impl SendMessageExecutor {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        templates: Arc<dyn TemplateRepository>,
        deals: Arc<dyn DealRepository>,
    ) -> Self {
        Self {
            conversations,
            messages,
            templates,
            deals,
        }
    }

    async fn resolve_conversation(&self, run: &WorkflowRun) -> Result<Conversation, StepError> {
        let conversation = match run.context_type {
            ContextType::Conversation => {
                self.conversations.get_conversation(&run.context_id).await?
            }
            ContextType::Contact => {
                self.conversations
                    .first_conversation_for_contact(&run.context_id)
                    .await?
            }
            ContextType::Deal => {
                let contact_id = self
                    .deals
                    .get_deal(&run.context_id)
                    .await?
                    .and_then(|deal| deal.primary_contact_id);
                match contact_id {
                    Some(contact_id) => {
                        self.conversations
                            .first_conversation_for_contact(&contact_id)
                            .await?
                    }
                    None => None,
                }
            }
        };

        conversation.ok_or_else(|| {
            StepError::MissingTarget(format!(
                "no conversation found for {} {}",
                run.context_type, run.context_id
            ))
        })
    }

    async fn resolve_content(
        &self,
        content: Option<&str>,
        template_id: Option<&str>,
    ) -> Result<String, StepError> {
        if let Some(content) = content.filter(|c| !c.trim().is_empty()) {
            return Ok(content.to_string());
        }
        let template_id = template_id
            .ok_or_else(|| StepError::Configuration("send_message has no content".to_string()))?;
        let template = self
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| {
                StepError::MissingTarget(format!("message template {} not found", template_id))
            })?;
        Ok(template.content)
    }
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_LEN).collect()
}

#[async_trait]
impl StepExecutor for SendMessageExecutor {
    fn step_type(&self) -> StepType {
        StepType::SendMessage
    }

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let StepConfig::SendMessage(config) = config else {
            return Err(mismatched(StepType::SendMessage, config));
        };
        config.validate()?;

        let raw = self
            .resolve_content(config.content.as_deref(), config.template_id.as_deref())
            .await?;
        let conversation = self.resolve_conversation(run).await?;
        let content = template::render(&raw, &run.collected_data)?;

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id.clone(),
            direction: MessageDirection::Outbound,
            content: content.clone(),
            sender_type: "workflow".to_string(),
            workflow_run_id: Some(run.id),
            created_at: Utc::now(),
        };
        self.messages.insert_message(&message).await?;
        self.conversations
            .record_outbound(&conversation.id, &preview(&content))
            .await?;

        tracing::debug!(
            run_id = %run.id,
            conversation_id = %conversation.id,
            message_id = %message.id,
            "Workflow message sent"
        );

        Ok(StepOutput::new(json!({
            "messageId": message.id,
            "conversationId": conversation.id,
            "content": content,
        })))
    }
}
