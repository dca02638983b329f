//! Typed step configuration.
//!
//! Each step type has its own config struct. Required fields are optional at
//! the serde level so a missing field surfaces as a `StepError` with a useful
//! message instead of a generic deserialization failure.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::engine::evaluator::Operator;
use crate::steps::StepError;

use super::types::StepType;

/// Tagged union of step configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum StepConfig {
    SendMessage(SendMessageConfig),
    SendEmail(SendEmailConfig),
    CreateTask(CreateTaskConfig),
    Wait(WaitConfig),
    Condition(ConditionConfig),
    AiAction(AiActionConfig),
}

fn from_raw<T: DeserializeOwned>(step_type: StepType, raw: &serde_json::Value) -> Result<T, StepError> {
    let value = if raw.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        raw.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| StepError::Configuration(format!("invalid {} config: {}", step_type, e)))
}

impl StepConfig {
    /// Parse and validate raw config for the given step type.
    pub fn parse(step_type: StepType, raw: &serde_json::Value) -> Result<Self, StepError> {
        let config = match step_type {
            StepType::SendMessage => StepConfig::SendMessage(from_raw(step_type, raw)?),
            StepType::SendEmail => StepConfig::SendEmail(from_raw(step_type, raw)?),
            StepType::CreateTask => StepConfig::CreateTask(from_raw(step_type, raw)?),
            StepType::Wait => StepConfig::Wait(from_raw(step_type, raw)?),
            StepType::Condition => StepConfig::Condition(from_raw(step_type, raw)?),
            StepType::AiAction => StepConfig::AiAction(from_raw(step_type, raw)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn step_type(&self) -> StepType {
        match self {
            StepConfig::SendMessage(_) => StepType::SendMessage,
            StepConfig::SendEmail(_) => StepType::SendEmail,
            StepConfig::CreateTask(_) => StepType::CreateTask,
            StepConfig::Wait(_) => StepType::Wait,
            StepConfig::Condition(_) => StepType::Condition,
            StepConfig::AiAction(_) => StepType::AiAction,
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), StepError> {
        match self {
            StepConfig::SendMessage(c) => c.validate(),
            StepConfig::SendEmail(c) => c.validate(),
            StepConfig::CreateTask(c) => c.validate(),
            StepConfig::Wait(c) => c.validate(),
            StepConfig::Condition(c) => c.validate().map(|_| ()),
            StepConfig::AiAction(_) => Ok(()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `send_message` config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageConfig {
    pub content: Option<String>,
    pub template_id: Option<String>,
}

impl SendMessageConfig {
    pub fn validate(&self) -> Result<(), StepError> {
        if non_empty(&self.content).is_none() && non_empty(&self.template_id).is_none() {
            return Err(StepError::Configuration(
                "send_message requires 'content' or 'templateId'".to_string(),
            ));
        }
        Ok(())
    }
}

/// `send_email` config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailConfig {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub use_contact_email: bool,
}

impl SendEmailConfig {
    pub fn validate(&self) -> Result<(), StepError> {
        if non_empty(&self.subject).is_none() || non_empty(&self.body).is_none() {
            return Err(StepError::Configuration(
                "send_email requires 'subject' and 'body'".to_string(),
            ));
        }
        Ok(())
    }
}

/// `create_task` config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskConfig {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub due_in_days: Option<i64>,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub assign_to_owner: bool,
    pub priority: Option<String>,
}

impl CreateTaskConfig {
    pub fn validate(&self) -> Result<(), StepError> {
        if non_empty(&self.subject).is_none() {
            return Err(StepError::Configuration(
                "create_task requires 'subject'".to_string(),
            ));
        }
        if let Some(days) = self.due_in_days {
            if !(0..=MAX_HORIZON_DAYS).contains(&days) {
                return Err(StepError::Configuration(format!(
                    "create_task dueInDays must be between 0 and {}, got {}",
                    MAX_HORIZON_DAYS, days
                )));
            }
        }
        Ok(())
    }
}

/// Longest wait and furthest task due date, in days.
pub const MAX_HORIZON_DAYS: i64 = 3650;

/// Unit for `wait` durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
}

impl WaitUnit {
    /// Unknown or missing units fall back to hours.
    pub fn parse(unit: Option<&str>) -> Self {
        match unit {
            Some("minutes") => WaitUnit::Minutes,
            Some("days") => WaitUnit::Days,
            _ => WaitUnit::Hours,
        }
    }

    pub fn millis(&self) -> i64 {
        match self {
            WaitUnit::Minutes => 60_000,
            WaitUnit::Hours => 3_600_000,
            WaitUnit::Days => 86_400_000,
        }
    }
}

/// `wait` config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    #[serde(default)]
    pub duration: f64,
    pub unit: Option<String>,
}

impl WaitConfig {
    pub fn validate(&self) -> Result<(), StepError> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(StepError::Configuration(format!(
                "wait duration must be a non-negative number, got {}",
                self.duration
            )));
        }
        let max_ms = (MAX_HORIZON_DAYS * WaitUnit::Days.millis()) as f64;
        if self.duration * self.unit().millis() as f64 > max_ms {
            return Err(StepError::Configuration(format!(
                "wait may not exceed {} days",
                MAX_HORIZON_DAYS
            )));
        }
        Ok(())
    }

    pub fn unit(&self) -> WaitUnit {
        WaitUnit::parse(self.unit.as_deref())
    }

    /// Delay in milliseconds.
    pub fn delay_ms(&self) -> i64 {
        (self.duration * self.unit().millis() as f64).round() as i64
    }
}

/// `condition` config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    pub field: Option<String>,
    pub operator: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
    pub true_step_id: Option<String>,
    pub false_step_id: Option<String>,
}

impl ConditionConfig {
    /// Check field and operator, returning the parsed operator.
    pub fn validate(&self) -> Result<(&str, Operator), StepError> {
        let field = non_empty(&self.field).ok_or_else(|| {
            StepError::Configuration("condition requires 'field'".to_string())
        })?;
        let operator = non_empty(&self.operator).ok_or_else(|| {
            StepError::Configuration("condition requires 'operator'".to_string())
        })?;
        let operator: Operator = operator
            .parse()
            .map_err(|_| StepError::UnsupportedOperator(operator.to_string()))?;
        if operator == Operator::In {
            return Err(StepError::UnsupportedOperator(operator.to_string()));
        }
        Ok((field, operator))
    }

    /// Branch targets that are configured.
    pub fn branch_targets(&self) -> impl Iterator<Item = &str> {
        self.true_step_id
            .as_deref()
            .into_iter()
            .chain(self.false_step_id.as_deref())
    }
}

/// `ai_action` config. Free-form; only recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiActionConfig {
    pub action: Option<String>,
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wait_beyond_horizon_rejected() {
        let err = StepConfig::parse(StepType::Wait, &json!({"duration": 1e12, "unit": "days"}))
            .unwrap_err();
        assert!(matches!(err, StepError::Configuration(_)));

        let ok = StepConfig::parse(StepType::Wait, &json!({"duration": 3650, "unit": "days"}));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_due_in_days_range() {
        for days in [i64::MAX, -1, MAX_HORIZON_DAYS + 1] {
            let err = StepConfig::parse(
                StepType::CreateTask,
                &json!({"subject": "Call", "dueInDays": days}),
            )
            .unwrap_err();
            assert!(matches!(err, StepError::Configuration(_)), "accepted {}", days);
        }
        let ok = StepConfig::parse(StepType::CreateTask, &json!({"subject": "Call", "dueInDays": 3}));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_send_message_requires_content_or_template() {
        let err = StepConfig::parse(StepType::SendMessage, &json!({})).unwrap_err();
        assert!(matches!(err, StepError::Configuration(_)));

        let ok = StepConfig::parse(StepType::SendMessage, &json!({"templateId": "t1"}));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_send_email_requires_subject_and_body() {
        let err = StepConfig::parse(StepType::SendEmail, &json!({"subject": "Hi"})).unwrap_err();
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn test_wait_units() {
        let wait = WaitConfig { duration: 1.0, unit: Some("hours".to_string()) };
        assert_eq!(wait.delay_ms(), 3_600_000);

        let wait = WaitConfig { duration: 30.0, unit: Some("minutes".to_string()) };
        assert_eq!(wait.delay_ms(), 1_800_000);

        let wait = WaitConfig { duration: 2.0, unit: Some("fortnights".to_string()) };
        assert_eq!(wait.unit(), WaitUnit::Hours);
        assert_eq!(wait.delay_ms(), 7_200_000);
    }

    #[test]
    fn test_wait_rejects_negative_duration() {
        let err = StepConfig::parse(StepType::Wait, &json!({"duration": -1})).unwrap_err();
        assert!(matches!(err, StepError::Configuration(_)));
    }

    #[test]
    fn test_condition_operator_validation() {
        let err = StepConfig::parse(
            StepType::Condition,
            &json!({"field": "amount", "operator": "between"}),
        )
        .unwrap_err();
        assert!(matches!(err, StepError::UnsupportedOperator(_)));

        let err = StepConfig::parse(
            StepType::Condition,
            &json!({"field": "amount", "operator": "in", "value": [1]}),
        )
        .unwrap_err();
        assert!(matches!(err, StepError::UnsupportedOperator(_)));

        let config = StepConfig::parse(
            StepType::Condition,
            &json!({"field": "data.amount", "operator": "greaterThan", "value": 1000}),
        )
        .unwrap();
        assert_eq!(config.step_type(), StepType::Condition);
    }

    #[test]
    fn test_ai_action_keeps_extra_fields() {
        let config = StepConfig::parse(
            StepType::AiAction,
            &json!({"action": "summarize", "model": "small"}),
        )
        .unwrap();
        match config {
            StepConfig::AiAction(c) => {
                assert_eq!(c.action.as_deref(), Some("summarize"));
                assert_eq!(c.extra.get("model"), Some(&json!("small")));
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
