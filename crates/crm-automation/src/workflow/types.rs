//! Workflow definition types.
//!
//! A definition is an ordered list of typed steps plus a trigger. Step
//! configuration is kept as raw JSON on the definition and parsed into the
//! typed [`StepConfig`](super::StepConfig) union when the definition is saved
//! and again right before a step executes.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::steps::StepError;

use super::step_config::StepConfig;

/// What starts a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    StageChange,
    NewEntity,
    InboundMessage,
    Scheduled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::StageChange => "stage_change",
            TriggerType::NewEntity => "new_entity",
            TriggerType::InboundMessage => "inbound_message",
            TriggerType::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "stage_change" => Ok(Self::StageChange),
            "new_entity" => Ok(Self::NewEntity),
            "inbound_message" => Ok(Self::InboundMessage),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(AppError::Parse(format!("Unknown trigger type: {}", other))),
        }
    }
}

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    SendMessage,
    SendEmail,
    CreateTask,
    Wait,
    Condition,
    AiAction,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::SendMessage => "send_message",
            StepType::SendEmail => "send_email",
            StepType::CreateTask => "create_task",
            StepType::Wait => "wait",
            StepType::Condition => "condition",
            StepType::AiAction => "ai_action",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One typed, ordered unit of work in a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step id, unique within its definition.
    pub id: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Type-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Sequencing key. Ties keep array position.
    #[serde(default)]
    pub order: i32,
}

impl Step {
    /// Parse the raw config into its typed form.
    pub fn typed_config(&self) -> Result<StepConfig, StepError> {
        StepConfig::parse(self.step_type, &self.config)
    }
}

/// A configured automation: trigger plus ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    pub trigger_type: TriggerType,

    /// Filter interpreted per trigger type. Null means "no constraint".
    #[serde(default)]
    pub trigger_config: serde_json::Value,

    pub steps: Vec<Step>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl WorkflowDefinition {
    /// Steps sorted by `order`; the sort is stable so equal orders keep
    /// their array position.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Lowest-order step.
    pub fn first_step(&self) -> Option<&Step> {
        self.ordered_steps().into_iter().next()
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step immediately after `id` by order, if any.
    pub fn next_step_after(&self, id: &str) -> Option<&Step> {
        let ordered = self.ordered_steps();
        let position = ordered.iter().position(|s| s.id == id)?;
        ordered.get(position + 1).copied()
    }

    /// Parse `trigger_config` into the filter shape for this trigger type.
    pub fn trigger_filter<T: DeserializeOwned + Default>(&self) -> Result<T, AppError> {
        if self.trigger_config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.trigger_config.clone()).map_err(|e| {
            AppError::Validation(format!(
                "Workflow '{}': invalid trigger config: {}",
                self.name, e
            ))
        })
    }
}

/// Filter for `stage_change` triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChangeFilter {
    pub pipeline_id: Option<String>,
    /// Target stage.
    pub stage_id: Option<String>,
    pub from_stage_id: Option<String>,
}

/// Filter for `new_entity` triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntityFilter {
    pub source: Option<String>,
    /// Matches when the entity carries at least one of these tags.
    pub tags: Option<Vec<String>>,
}

/// Filter for `inbound_message` triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessageFilter {
    /// Case-insensitive substrings; any one matching is enough.
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub first_message_only: bool,
    #[serde(default)]
    pub ai_enabled_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(steps: serde_json::Value) -> WorkflowDefinition {
        serde_json::from_value(json!({
            "name": "follow up",
            "triggerType": "manual",
            "steps": steps,
        }))
        .unwrap()
    }

    #[test]
    fn test_ordered_steps_ties_keep_array_position() {
        let def = definition(json!([
            {"id": "c", "type": "wait", "order": 2},
            {"id": "a", "type": "wait", "order": 1},
            {"id": "b", "type": "wait", "order": 1},
        ]));

        let ids: Vec<&str> = def.ordered_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(def.first_step().unwrap().id, "a");
        assert_eq!(def.next_step_after("b").unwrap().id, "c");
        assert!(def.next_step_after("c").is_none());
        assert!(def.next_step_after("missing").is_none());
    }

    #[test]
    fn test_definition_defaults() {
        let def = definition(json!([]));
        assert!(def.is_active);
        assert!(def.trigger_config.is_null());
        let filter: StageChangeFilter = def.trigger_filter().unwrap();
        assert!(filter.pipeline_id.is_none());
    }

    #[test]
    fn test_trigger_filter_parse() {
        let mut def = definition(json!([]));
        def.trigger_config = json!({"keywords": ["pricing"], "firstMessageOnly": true});
        let filter: InboundMessageFilter = def.trigger_filter().unwrap();
        assert_eq!(filter.keywords.unwrap(), vec!["pricing"]);
        assert!(filter.first_message_only);
        assert!(!filter.ai_enabled_only);
    }

    #[test]
    fn test_trigger_type_round_trip_str() {
        assert_eq!("stage_change".parse::<TriggerType>().unwrap(), TriggerType::StageChange);
        assert_eq!(TriggerType::InboundMessage.to_string(), "inbound_message");
        assert!("weekly".parse::<TriggerType>().is_err());
    }
}
