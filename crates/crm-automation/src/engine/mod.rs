//! Workflow execution engine.
//!
//! - **Dispatcher**: executes a run's current step and applies the transition
//! - **Evaluator**: clause evaluation shared by conditions and approval rules
//! - **Template**: `{{path}}` placeholder substitution
//! - **Approval**: approval-rule matching

pub mod approval;
pub mod dispatcher;
pub mod evaluator;
pub mod template;

pub use approval::{ApprovalMatcher, ApprovalRule};
pub use dispatcher::{StepDispatcher, Transition};
pub use evaluator::{Clause, ConditionEvaluator, Operator};
