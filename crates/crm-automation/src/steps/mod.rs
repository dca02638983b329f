//! Step executors.
//!
//! One executor per step type. An executor turns `(run, config)` into a
//! [`StepOutput`] or a [`StepError`]; its only side effects go through the
//! narrow repository traits it was built with. The dispatcher decides what
//! happens to the run afterwards.

pub mod ai_action;
pub mod condition;
pub mod create_task;
pub mod error;
pub mod send_email;
pub mod send_message;
pub mod wait;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::{ContactRepository, ConversationRepository, DealRepository, Repositories};
use crate::workflow::{ContextType, StepConfig, StepType, WorkflowRun};

pub use ai_action::AiActionExecutor;
pub use condition::ConditionExecutor;
pub use create_task::CreateTaskExecutor;
pub use error::StepError;
pub use send_email::SendEmailExecutor;
pub use send_message::SendMessageExecutor;
pub use wait::WaitExecutor;

/// Result of a successful step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Stored under `step_<id>_output` in collected data.
    pub output: serde_json::Value,

    /// Explicit next step, overriding sequential order.
    pub branch: Option<String>,

    /// Suspend the run until this time.
    pub suspend_until: Option<DateTime<Utc>>,
}

impl StepOutput {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn suspend_until(mut self, wake_at: DateTime<Utc>) -> Self {
        self.suspend_until = Some(wake_at);
        self
    }
}

/// Executes one step type.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn step_type(&self) -> StepType;

    async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError>;
}

/// Registry of executors keyed by step type.
pub struct StepRegistry {
    executors: HashMap<StepType, Arc<dyn StepExecutor>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor, replacing any previous one for the same type.
    pub fn register<E: StepExecutor + 'static>(&mut self, executor: E) {
        self.executors
            .insert(executor.step_type(), Arc::new(executor));
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(&step_type).cloned()
    }

    pub fn has(&self, step_type: StepType) -> bool {
        self.executors.contains_key(&step_type)
    }

    /// Execute `config` with the executor registered for its type.
    pub async fn execute(
        &self,
        run: &WorkflowRun,
        config: &StepConfig,
    ) -> Result<StepOutput, StepError> {
        let step_type = config.step_type();
        let executor = self
            .get(step_type)
            .ok_or_else(|| StepError::NotRegistered(step_type.to_string()))?;
        executor.execute(run, config).await
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry with every built-in executor wired to `repos`.
pub fn create_default_registry(repos: &Repositories) -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(SendMessageExecutor::new(
        repos.conversations.clone(),
        repos.messages.clone(),
        repos.templates.clone(),
        repos.deals.clone(),
    ));
    registry.register(SendEmailExecutor::new(
        repos.contacts.clone(),
        repos.deals.clone(),
        repos.conversations.clone(),
        repos.activities.clone(),
    ));
    registry.register(CreateTaskExecutor::new(
        repos.contacts.clone(),
        repos.deals.clone(),
        repos.conversations.clone(),
        repos.activities.clone(),
    ));
    registry.register(WaitExecutor);
    registry.register(ConditionExecutor::new(repos.contexts.clone()));
    registry.register(AiActionExecutor::new(repos.audit.clone()));
    registry
}

/// Error for an executor handed another step type's config.
pub(crate) fn mismatched(expected: StepType, config: &StepConfig) -> StepError {
    StepError::Configuration(format!(
        "{} executor received {} config",
        expected,
        config.step_type()
    ))
}

/// The contact a run acts on, if any: the context contact itself, the deal's
/// primary contact, or the conversation's contact.
pub(crate) async fn resolve_contact_id(
    run: &WorkflowRun,
    deals: &dyn DealRepository,
    conversations: &dyn ConversationRepository,
) -> Result<Option<String>, StepError> {
    let contact_id = match run.context_type {
        ContextType::Contact => Some(run.context_id.clone()),
        ContextType::Deal => deals
            .get_deal(&run.context_id)
            .await?
            .and_then(|deal| deal.primary_contact_id),
        ContextType::Conversation => conversations
            .get_conversation(&run.context_id)
            .await?
            .and_then(|conv| conv.contact_id),
    };
    Ok(contact_id)
}

/// Owner of the run's context entity. Conversations use their contact's owner.
pub(crate) async fn resolve_owner_id(
    run: &WorkflowRun,
    contacts: &dyn ContactRepository,
    deals: &dyn DealRepository,
    conversations: &dyn ConversationRepository,
) -> Result<Option<String>, StepError> {
    let owner = match run.context_type {
        ContextType::Deal => deals
            .get_deal(&run.context_id)
            .await?
            .and_then(|deal| deal.owner_id),
        ContextType::Contact | ContextType::Conversation => {
            match resolve_contact_id(run, deals, conversations).await? {
                Some(contact_id) => contacts
                    .get_contact(&contact_id)
                    .await?
                    .and_then(|contact| contact.owner_id),
                None => None,
            }
        }
    };
    Ok(owner)
}

/// Contact and deal ids to link an activity to.
pub(crate) async fn activity_links(
    run: &WorkflowRun,
    deals: &dyn DealRepository,
    conversations: &dyn ConversationRepository,
) -> Result<(Option<String>, Option<String>), StepError> {
    let deal_id = match run.context_type {
        ContextType::Deal => Some(run.context_id.clone()),
        _ => None,
    };
    let contact_id = resolve_contact_id(run, deals, conversations).await?;
    Ok((contact_id, deal_id))
}
