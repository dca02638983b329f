//! Workflow run state.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Run status. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::Parse(format!("Unknown run status: {}", other))),
        }
    }
}

/// Kind of business entity a run acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Contact,
    Deal,
    Conversation,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Contact => "contact",
            ContextType::Deal => "deal",
            ContextType::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(Self::Contact),
            "deal" => Ok(Self::Deal),
            "conversation" => Ok(Self::Conversation),
            other => Err(AppError::Parse(format!("Unknown context type: {}", other))),
        }
    }
}

/// Who ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// Dispatcher or continuation reached the end, or a step failed.
    Automation,
    /// `advance` past the last step.
    ManualAdvance,
    Cancellation,
}

impl CompletionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionSource::Automation => "automation",
            CompletionSource::ManualAdvance => "manual_advance",
            CompletionSource::Cancellation => "cancellation",
        }
    }
}

impl FromStr for CompletionSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automation" => Ok(Self::Automation),
            "manual_advance" => Ok(Self::ManualAdvance),
            "cancellation" => Ok(Self::Cancellation),
            other => Err(AppError::Parse(format!("Unknown completion source: {}", other))),
        }
    }
}

/// One execution of a definition against a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub context_type: ContextType,
    pub context_id: String,
    pub current_step_id: String,
    pub status: RunStatus,
    /// Append-only run memory.
    pub collected_data: serde_json::Map<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<CompletionSource>,
    /// Wake time while suspended on a wait step.
    pub next_step_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create an active run positioned at `first_step_id`.
    pub fn new(
        workflow_id: Uuid,
        context_type: ContextType,
        context_id: impl Into<String>,
        first_step_id: impl Into<String>,
        initial_data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            context_type,
            context_id: context_id.into(),
            current_step_id: first_step_id.into(),
            status: RunStatus::Active,
            collected_data: initial_data,
            started_at: Utc::now(),
            completed_at: None,
            completed_by: None,
            next_step_at: None,
        }
    }

    /// Merge keys into collected data. Existing keys are overwritten, never removed.
    pub fn merge_data(&mut self, data: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in data {
            self.collected_data.insert(key, value);
        }
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.collected_data.insert(key.into(), value);
    }

    pub fn complete(&mut self, source: CompletionSource) {
        self.finish(RunStatus::Completed, source);
    }

    pub fn fail(&mut self, source: CompletionSource) {
        self.finish(RunStatus::Failed, source);
    }

    fn finish(&mut self, status: RunStatus, source: CompletionSource) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.completed_by = Some(source);
        self.next_step_at = None;
    }

    pub fn is_conversation(&self) -> bool {
        self.context_type == ContextType::Conversation
    }
}
