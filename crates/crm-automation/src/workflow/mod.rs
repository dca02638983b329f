//! Workflow definitions and runs.
//!
//! - **types**: definitions, steps, trigger filters
//! - **step_config**: typed per-step configuration
//! - **run**: run state and status
//! - **parser**: definition loading and validation

pub mod parser;
pub mod run;
pub mod step_config;
pub mod types;

pub use run::{CompletionSource, ContextType, RunStatus, WorkflowRun};
pub use step_config::StepConfig;
pub use types::{Step, StepType, TriggerType, WorkflowDefinition};
