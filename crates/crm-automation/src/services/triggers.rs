//! Trigger evaluation.
//!
//! Entry points called by external event sources. Each loads the active
//! definitions for its trigger type, tests the event against every
//! definition's filter and starts a run for each match that does not
//! already have an active run on the same context.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;
use crate::scheduler::{Job, Scheduler};
use crate::store::{AuditEntry, Contact, Conversation, Repositories};
use crate::workflow::types::{InboundMessageFilter, NewEntityFilter, StageChangeFilter};
use crate::workflow::{ContextType, TriggerType, WorkflowDefinition, WorkflowRun};

/// A deal moved between stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChangeEvent {
    pub deal_id: String,
    pub previous_stage_id: Option<String>,
    pub new_stage_id: String,
    pub pipeline_id: String,
}

/// A contact was created.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntityEvent {
    pub entity_id: String,
}

/// A message arrived in a conversation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessageEvent {
    pub conversation_id: String,
    pub content: String,
    pub message_id: String,
}

/// Runs started by one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub triggered: usize,
    pub run_ids: Vec<Uuid>,
}

impl TriggerOutcome {
    fn push(&mut self, run_id: Uuid) {
        self.triggered += 1;
        self.run_ids.push(run_id);
    }
}

#[derive(Clone)]
pub struct TriggerEvaluator {
    repos: Repositories,
    scheduler: Arc<dyn Scheduler>,
}

impl TriggerEvaluator {
    pub fn new(repos: Repositories, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { repos, scheduler }
    }

    pub async fn on_stage_change(&self, event: StageChangeEvent) -> AppResult<TriggerOutcome> {
        let deal = self.repos.deals.get_deal(&event.deal_id).await?;

        let mut data = Map::new();
        data.insert("dealId".to_string(), json!(event.deal_id));
        data.insert("pipelineId".to_string(), json!(event.pipeline_id));
        data.insert("previousStageId".to_string(), json!(event.previous_stage_id));
        data.insert("newStageId".to_string(), json!(event.new_stage_id));
        if let Some(deal) = &deal {
            data.insert("dealTitle".to_string(), json!(deal.title));
            data.insert("amount".to_string(), json!(deal.amount));
            data.insert("contactId".to_string(), json!(deal.primary_contact_id));
        }

        let mut outcome = TriggerOutcome::default();
        for definition in self.candidates(TriggerType::StageChange).await? {
            let Some(filter) = parse_filter::<StageChangeFilter>(&definition) else {
                continue;
            };
            if !stage_change_matches(&filter, &event) {
                continue;
            }
            if let Some(run) = self
                .launch(&definition, ContextType::Deal, &event.deal_id, data.clone())
                .await?
            {
                outcome.push(run.id);
            }
        }

        debug!(deal_id = %event.deal_id, triggered = outcome.triggered, "Stage change evaluated");
        Ok(outcome)
    }

    pub async fn on_new_entity(&self, event: NewEntityEvent) -> AppResult<TriggerOutcome> {
        let contact = self
            .repos
            .contacts
            .get_contact(&event.entity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Contact '{}' not found", event.entity_id)))?;

        let mut data = Map::new();
        data.insert("contactId".to_string(), json!(contact.id));
        data.insert("contactName".to_string(), json!(contact.name));
        data.insert("email".to_string(), json!(contact.email));
        data.insert("source".to_string(), json!(contact.source));
        data.insert("tags".to_string(), json!(contact.tags));

        let mut outcome = TriggerOutcome::default();
        for definition in self.candidates(TriggerType::NewEntity).await? {
            let Some(filter) = parse_filter::<NewEntityFilter>(&definition) else {
                continue;
            };
            if !new_entity_matches(&filter, &contact) {
                continue;
            }
            if let Some(run) = self
                .launch(&definition, ContextType::Contact, &contact.id, data.clone())
                .await?
            {
                outcome.push(run.id);
            }
        }

        debug!(contact_id = %contact.id, triggered = outcome.triggered, "New entity evaluated");
        Ok(outcome)
    }

    pub async fn on_inbound_message(&self, event: InboundMessageEvent) -> AppResult<TriggerOutcome> {
        let conversation = self
            .repos
            .conversations
            .get_conversation(&event.conversation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation '{}' not found", event.conversation_id))
            })?;

        let mut data = Map::new();
        data.insert("conversationId".to_string(), json!(conversation.id));
        data.insert("messageId".to_string(), json!(event.message_id));
        data.insert("messageContent".to_string(), json!(event.content));
        data.insert("contactId".to_string(), json!(conversation.contact_id));

        let mut outcome = TriggerOutcome::default();
        for definition in self.candidates(TriggerType::InboundMessage).await? {
            let Some(filter) = parse_filter::<InboundMessageFilter>(&definition) else {
                continue;
            };
            if !inbound_message_matches(&filter, &conversation, &event.content) {
                continue;
            }
            if let Some(run) = self
                .launch(&definition, ContextType::Conversation, &conversation.id, data.clone())
                .await?
            {
                outcome.push(run.id);
            }
        }

        debug!(
            conversation_id = %conversation.id,
            triggered = outcome.triggered,
            "Inbound message evaluated"
        );
        Ok(outcome)
    }

    async fn candidates(&self, trigger_type: TriggerType) -> AppResult<Vec<WorkflowDefinition>> {
        self.repos.definitions.list_active_by_trigger(trigger_type).await
    }

    /// Create and dispatch a run unless the context already has one active.
    async fn launch(
        &self,
        definition: &WorkflowDefinition,
        context_type: ContextType,
        context_id: &str,
        data: Map<String, Value>,
    ) -> AppResult<Option<WorkflowRun>> {
        if self
            .repos
            .runs
            .find_active_run(definition.id, context_type, context_id)
            .await?
            .is_some()
        {
            debug!(
                workflow_id = %definition.id,
                context_type = %context_type,
                context_id = %context_id,
                "Active run exists, trigger skipped"
            );
            return Ok(None);
        }

        let Some(first_step) = definition.first_step() else {
            warn!(workflow_id = %definition.id, "Triggered workflow has no steps");
            return Ok(None);
        };

        let run = WorkflowRun::new(definition.id, context_type, context_id, first_step.id.clone(), data);
        match self.repos.runs.insert_run(&run).await {
            Ok(()) => {}
            Err(AppError::Conflict(msg)) => {
                warn!(workflow_id = %definition.id, error = %msg, "Concurrent run start, trigger skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        info!(
            run_id = %run.id,
            workflow_id = %definition.id,
            trigger_type = %definition.trigger_type,
            context_type = %context_type,
            context_id = %context_id,
            "Workflow triggered"
        );

        // Stamp before dispatch so a fast run cannot finish first.
        if context_type == ContextType::Conversation {
            let _ = self
                .repos
                .conversations
                .mark_workflow_active(context_id, run.id)
                .await
                .log(format!("stamping conversation {} for run {}", context_id, run.id));
        }

        let entry = AuditEntry::for_run(
            run.id,
            "workflow.triggered",
            json!({ "workflowId": definition.id, "triggerType": definition.trigger_type }),
        );
        let _ = self.repos.audit.record(&entry).await.log("writing audit entry");
        let _ = self
            .scheduler
            .schedule(Duration::ZERO, Job::Dispatch { run_id: run.id })
            .await
            .log(format!("scheduling dispatch for run {}", run.id));

        Ok(Some(run))
    }
}

fn parse_filter<T: serde::de::DeserializeOwned + Default>(
    definition: &WorkflowDefinition,
) -> Option<T> {
    match definition.trigger_filter::<T>() {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!(workflow_id = %definition.id, error = %e, "Skipping workflow with bad trigger config");
            None
        }
    }
}

fn stage_change_matches(filter: &StageChangeFilter, event: &StageChangeEvent) -> bool {
    filter
        .pipeline_id
        .as_ref()
        .map_or(true, |p| *p == event.pipeline_id)
        && filter
            .stage_id
            .as_ref()
            .map_or(true, |s| *s == event.new_stage_id)
        && filter
            .from_stage_id
            .as_ref()
            .map_or(true, |s| event.previous_stage_id.as_ref() == Some(s))
}

fn new_entity_matches(filter: &NewEntityFilter, contact: &Contact) -> bool {
    let source_ok = filter
        .source
        .as_ref()
        .map_or(true, |s| contact.source.as_ref() == Some(s));
    let tags_ok = match filter.tags.as_deref() {
        None | Some([]) => true,
        Some(tags) => tags.iter().any(|t| contact.tags.contains(t)),
    };
    source_ok && tags_ok
}

fn inbound_message_matches(
    filter: &InboundMessageFilter,
    conversation: &Conversation,
    content: &str,
) -> bool {
    let content = content.to_lowercase();
    let keywords_ok = match filter.keywords.as_deref() {
        None | Some([]) => true,
        Some(keywords) => keywords
            .iter()
            .any(|k| content.contains(&k.to_lowercase())),
    };
    let first_ok = !filter.first_message_only || conversation.message_count == 1;
    let ai_ok = !filter.ai_enabled_only || conversation.ai_enabled;
    keywords_ok && first_ok && ai_ok
}
