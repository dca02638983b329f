//! Workflow definition parsing and validation.
//!
//! Definitions are validated when saved so that malformed step configs,
//! duplicate step ids and dangling branch targets are rejected up front
//! instead of failing a run halfway through.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::workflow::step_config::StepConfig;
use crate::workflow::types::{
    InboundMessageFilter, NewEntityFilter, StageChangeFilter, TriggerType, WorkflowDefinition,
};

/// Parse definitions from YAML (a single mapping or a sequence).
///
/// JSON is a subset of YAML, so JSON files go through the same path.
pub fn parse_definitions(content: &str) -> AppResult<Vec<WorkflowDefinition>> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;

    let definitions: Vec<WorkflowDefinition> = if value.is_sequence() {
        serde_yaml::from_value(value)?
    } else if let Some(list) = value.get("workflows") {
        serde_yaml::from_value(list.clone())?
    } else if value.is_mapping() {
        vec![serde_yaml::from_value(value)?]
    } else {
        return Err(AppError::Parse(
            "Expected a workflow definition or a list of definitions".to_string(),
        ));
    };

    for definition in &definitions {
        validate_definition(definition)?;
    }

    Ok(definitions)
}

/// Read and parse a definitions file.
pub fn load_definitions_file(path: &Path) -> AppResult<Vec<WorkflowDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Cannot read definitions file {}: {}", path.display(), e))
    })?;
    parse_definitions(&content)
}

/// Validate a definition before it is saved.
pub fn validate_definition(definition: &WorkflowDefinition) -> AppResult<()> {
    if definition.name.trim().is_empty() {
        return Err(AppError::Validation("Workflow name must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    for step in &definition.steps {
        if step.id.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Workflow '{}': step id must not be empty",
                definition.name
            )));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Workflow '{}': duplicate step id '{}'",
                definition.name, step.id
            )));
        }
    }

    for step in &definition.steps {
        let config = step.typed_config().map_err(|e| {
            AppError::Validation(format!(
                "Workflow '{}', step '{}': {}",
                definition.name, step.id, e
            ))
        })?;

        if let StepConfig::Condition(condition) = &config {
            for target in condition.branch_targets() {
                if !seen.contains(target) {
                    return Err(AppError::Validation(format!(
                        "Workflow '{}', step '{}': branch target '{}' does not exist",
                        definition.name, step.id, target
                    )));
                }
            }
        }
    }

    validate_trigger_config(definition)
}

fn validate_trigger_config(definition: &WorkflowDefinition) -> AppResult<()> {
    match definition.trigger_type {
        TriggerType::StageChange => definition.trigger_filter::<StageChangeFilter>().map(|_| ()),
        TriggerType::NewEntity => definition.trigger_filter::<NewEntityFilter>().map(|_| ()),
        TriggerType::InboundMessage => {
            definition.trigger_filter::<InboundMessageFilter>().map(|_| ())
        }
        TriggerType::Manual | TriggerType::Scheduled => Ok(()),
    }
}
