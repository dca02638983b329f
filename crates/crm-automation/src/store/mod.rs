//! Storage ports.
//!
//! The engine never touches a database directly. Each concern is a narrow
//! async trait so executors only see the collaborators they need and tests
//! can swap in [`MemoryStore`].

pub mod entities;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::workflow::{ContextType, RunStatus, TriggerType, WorkflowDefinition, WorkflowRun};

pub use entities::{
    Activity, ActivityKind, AuditEntry, Contact, Conversation, ConversationStatus, Deal, Message,
    MessageDirection, MessageTemplate,
};
pub use memory::MemoryStore;

/// Workflow definition storage.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get_definition(&self, id: Uuid) -> AppResult<Option<WorkflowDefinition>>;

    async fn list_definitions(&self) -> AppResult<Vec<WorkflowDefinition>>;

    /// Active definitions for a trigger type, oldest first.
    async fn list_active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowDefinition>>;

    /// Insert or replace by id.
    async fn save_definition(&self, definition: &WorkflowDefinition) -> AppResult<()>;
}

/// Filter for listing runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<RunStatus>,
    pub context_type: Option<ContextType>,
    pub context_id: Option<String>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn matches(&self, run: &WorkflowRun) -> bool {
        self.workflow_id.map_or(true, |id| run.workflow_id == id)
            && self.status.map_or(true, |s| run.status == s)
            && self.context_type.map_or(true, |t| run.context_type == t)
            && self
                .context_id
                .as_ref()
                .map_or(true, |id| &run.context_id == id)
    }
}

/// Workflow run storage.
///
/// Implementations must reject a second `active` run for the same
/// (workflow, context type, context id) with `AppError::Conflict`, on both
/// insert and update.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn get_run(&self, id: Uuid) -> AppResult<Option<WorkflowRun>>;

    async fn find_active_run(
        &self,
        workflow_id: Uuid,
        context_type: ContextType,
        context_id: &str,
    ) -> AppResult<Option<WorkflowRun>>;

    async fn insert_run(&self, run: &WorkflowRun) -> AppResult<()>;

    /// Write back every mutable field of the run.
    async fn update_run(&self, run: &WorkflowRun) -> AppResult<()>;

    /// Newest first.
    async fn list_runs(&self, filter: &RunFilter) -> AppResult<Vec<WorkflowRun>>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get_contact(&self, id: &str) -> AppResult<Option<Contact>>;
}

#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn get_deal(&self, id: &str) -> AppResult<Option<Deal>>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn get_conversation(&self, id: &str) -> AppResult<Option<Conversation>>;

    /// The contact's oldest conversation.
    async fn first_conversation_for_contact(
        &self,
        contact_id: &str,
    ) -> AppResult<Option<Conversation>>;

    /// Bump the message counter and preview after an outbound message.
    async fn record_outbound(&self, id: &str, preview: &str) -> AppResult<()>;

    /// Stamp the conversation as driven by `run_id`.
    async fn mark_workflow_active(&self, id: &str, run_id: Uuid) -> AppResult<()>;

    /// Reset the workflow indicator if it still names `run_id`.
    /// Returns whether anything changed.
    async fn clear_workflow_active(&self, id: &str, run_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: &Message) -> AppResult<()>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn insert_activity(&self, activity: &Activity) -> AppResult<()>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get_template(&self, id: &str) -> AppResult<Option<MessageTemplate>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()>;
}

/// Live view of a run's context entity, as JSON, for `context.` conditions.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn load_context(
        &self,
        context_type: ContextType,
        id: &str,
    ) -> AppResult<Option<serde_json::Value>>;
}

/// Every port the engine needs, bundled for wiring.
#[derive(Clone)]
pub struct Repositories {
    pub definitions: Arc<dyn DefinitionStore>,
    pub runs: Arc<dyn RunStore>,
    pub contacts: Arc<dyn ContactRepository>,
    pub deals: Arc<dyn DealRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub contexts: Arc<dyn ContextRepository>,
}

impl Repositories {
    /// Wire every port to one in-memory store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            definitions: store.clone(),
            runs: store.clone(),
            contacts: store.clone(),
            deals: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            activities: store.clone(),
            templates: store.clone(),
            audit: store.clone(),
            contexts: store,
        }
    }
}
