//! In-memory implementation of every storage port.
//!
//! Used by tests, by embedders that drive the engine directly, and by the
//! server when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::workflow::{ContextType, RunStatus, TriggerType, WorkflowDefinition, WorkflowRun};

use super::entities::{
    Activity, AuditEntry, Contact, Conversation, ConversationStatus, Deal, Message,
    MessageTemplate,
};
use super::{
    ActivityRepository, AuditLog, ContactRepository, ContextRepository, ConversationRepository,
    DealRepository, DefinitionStore, MessageRepository, RunFilter, RunStore, TemplateRepository,
};

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
    contacts: RwLock<HashMap<String, Contact>>,
    deals: RwLock<HashMap<String, Deal>>,
    /// Insertion order doubles as creation order.
    conversations: RwLock<Vec<Conversation>>,
    messages: RwLock<Vec<Message>>,
    activities: RwLock<Vec<Activity>>,
    templates: RwLock<HashMap<String, MessageTemplate>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_contact(&self, contact: Contact) {
        self.contacts
            .write()
            .await
            .insert(contact.id.clone(), contact);
    }

    pub async fn upsert_deal(&self, deal: Deal) {
        self.deals.write().await.insert(deal.id.clone(), deal);
    }

    pub async fn upsert_conversation(&self, conversation: Conversation) {
        let mut conversations = self.conversations.write().await;
        match conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => conversations.push(conversation),
        }
    }

    pub async fn upsert_template(&self, template: MessageTemplate) {
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn activities(&self) -> Vec<Activity> {
        self.activities.read().await.clone()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }

    /// Audit actions recorded for one run, in order.
    pub async fn audit_actions_for(&self, run_id: Uuid) -> Vec<String> {
        let run_id = run_id.to_string();
        self.audit
            .read()
            .await
            .iter()
            .filter(|e| e.entity_id == run_id)
            .map(|e| e.action.clone())
            .collect()
    }
}

fn holds_active_slot(existing: &WorkflowRun, run: &WorkflowRun) -> bool {
    existing.id != run.id
        && existing.status == RunStatus::Active
        && existing.workflow_id == run.workflow_id
        && existing.context_type == run.context_type
        && existing.context_id == run.context_id
}

fn active_conflict(run: &WorkflowRun) -> AppError {
    AppError::Conflict(format!(
        "workflow {} already has an active run for {} {}",
        run.workflow_id, run.context_type, run.context_id
    ))
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn get_definition(&self, id: Uuid) -> AppResult<Option<WorkflowDefinition>> {
        Ok(self.definitions.read().await.get(&id).cloned())
    }

    async fn list_definitions(&self) -> AppResult<Vec<WorkflowDefinition>> {
        let mut definitions: Vec<_> = self.definitions.read().await.values().cloned().collect();
        definitions.sort_by_key(|d| d.created_at);
        Ok(definitions)
    }

    async fn list_active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowDefinition>> {
        let mut definitions: Vec<_> = self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| d.is_active && d.trigger_type == trigger_type)
            .cloned()
            .collect();
        definitions.sort_by_key(|d| d.created_at);
        Ok(definitions)
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> AppResult<()> {
        self.definitions
            .write()
            .await
            .insert(definition.id, definition.clone());
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn get_run(&self, id: Uuid) -> AppResult<Option<WorkflowRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn find_active_run(
        &self,
        workflow_id: Uuid,
        context_type: ContextType,
        context_id: &str,
    ) -> AppResult<Option<WorkflowRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .find(|r| {
                r.status == RunStatus::Active
                    && r.workflow_id == workflow_id
                    && r.context_type == context_type
                    && r.context_id == context_id
            })
            .cloned())
    }

    async fn insert_run(&self, run: &WorkflowRun) -> AppResult<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(AppError::Conflict(format!("run {} already exists", run.id)));
        }
        if run.status == RunStatus::Active && runs.values().any(|r| holds_active_slot(r, run)) {
            return Err(active_conflict(run));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &WorkflowRun) -> AppResult<()> {
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(AppError::NotFound(format!("run {}", run.id)));
        }
        if run.status == RunStatus::Active && runs.values().any(|r| holds_active_slot(r, run)) {
            return Err(active_conflict(run));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn list_runs(&self, filter: &RunFilter) -> AppResult<Vec<WorkflowRun>> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = filter.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn get_contact(&self, id: &str) -> AppResult<Option<Contact>> {
        Ok(self.contacts.read().await.get(id).cloned())
    }
}

#[async_trait]
impl DealRepository for MemoryStore {
    async fn get_deal(&self, id: &str) -> AppResult<Option<Deal>> {
        Ok(self.deals.read().await.get(id).cloned())
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn get_conversation(&self, id: &str) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn first_conversation_for_contact(
        &self,
        contact_id: &str,
    ) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .iter()
            .find(|c| c.contact_id.as_deref() == Some(contact_id))
            .cloned())
    }

    async fn record_outbound(&self, id: &str, preview: &str) -> AppResult<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))?;
        conversation.message_count += 1;
        conversation.last_message_preview = Some(preview.to_string());
        conversation.last_message_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_workflow_active(&self, id: &str, run_id: Uuid) -> AppResult<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))?;
        conversation.status = ConversationStatus::Automated;
        conversation.active_workflow_run_id = Some(run_id);
        Ok(())
    }

    async fn clear_workflow_active(&self, id: &str, run_id: Uuid) -> AppResult<bool> {
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        if conversation.active_workflow_run_id != Some(run_id) {
            return Ok(false);
        }
        conversation.active_workflow_run_id = None;
        if conversation.status == ConversationStatus::Automated {
            conversation.status = ConversationStatus::Open;
        }
        Ok(true)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn insert_activity(&self, activity: &Activity) -> AppResult<()> {
        self.activities.write().await.push(activity.clone());
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn get_template(&self, id: &str) -> AppResult<Option<MessageTemplate>> {
        Ok(self.templates.read().await.get(id).cloned())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl ContextRepository for MemoryStore {
    async fn load_context(
        &self,
        context_type: ContextType,
        id: &str,
    ) -> AppResult<Option<serde_json::Value>> {
        let value = match context_type {
            ContextType::Contact => self
                .get_contact(id)
                .await?
                .map(serde_json::to_value)
                .transpose()?,
            ContextType::Deal => self.get_deal(id).await?.map(serde_json::to_value).transpose()?,
            ContextType::Conversation => self
                .get_conversation(id)
                .await?
                .map(serde_json::to_value)
                .transpose()?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(workflow_id: Uuid, context_id: &str) -> WorkflowRun {
        WorkflowRun::new(workflow_id, ContextType::Contact, context_id, "a", Default::default())
    }

    fn conversation(id: &str, contact_id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            contact_id: Some(contact_id.to_string()),
            status: ConversationStatus::Open,
            active_workflow_run_id: None,
            ai_enabled: false,
            message_count: 0,
            last_message_preview: None,
            last_message_at: None,
        }
    }

    #[tokio::test]
    async fn test_second_active_run_conflicts() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();

        store.insert_run(&run(workflow_id, "c1")).await.unwrap();
        let err = store.insert_run(&run(workflow_id, "c1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Different context is fine.
        store.insert_run(&run(workflow_id, "c2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_enforces_active_slot() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();

        let mut paused = run(workflow_id, "c1");
        paused.status = RunStatus::Paused;
        store.insert_run(&paused).await.unwrap();
        store.insert_run(&run(workflow_id, "c1")).await.unwrap();

        paused.status = RunStatus::Active;
        let err = store.update_run(&paused).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_first_conversation_for_contact_uses_insertion_order() {
        let store = MemoryStore::new();
        store.upsert_conversation(conversation("v1", "c1")).await;
        store.upsert_conversation(conversation("v2", "c1")).await;

        let first = store.first_conversation_for_contact("c1").await.unwrap().unwrap();
        assert_eq!(first.id, "v1");
        assert!(store.first_conversation_for_contact("c9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_workflow_active_only_for_matching_run() {
        let store = MemoryStore::new();
        store.upsert_conversation(conversation("v1", "c1")).await;
        let run_id = Uuid::new_v4();
        store.mark_workflow_active("v1", run_id).await.unwrap();

        assert!(!store.clear_workflow_active("v1", Uuid::new_v4()).await.unwrap());
        assert!(store.clear_workflow_active("v1", run_id).await.unwrap());

        let conv = store.get_conversation("v1").await.unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Open);
        assert!(conv.active_workflow_run_id.is_none());
    }

    #[tokio::test]
    async fn test_list_runs_filter() {
        let store = MemoryStore::new();
        let workflow_id = Uuid::new_v4();
        store.insert_run(&run(workflow_id, "c1")).await.unwrap();
        store.insert_run(&run(Uuid::new_v4(), "c1")).await.unwrap();

        let filter = RunFilter {
            workflow_id: Some(workflow_id),
            ..Default::default()
        };
        assert_eq!(store.list_runs(&filter).await.unwrap().len(), 1);
        assert_eq!(store.list_runs(&RunFilter::default()).await.unwrap().len(), 2);
    }
}
