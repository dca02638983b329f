//! Service layer.
//!
//! Services hold the public operations of the engine and coordinate
//! between the HTTP handlers, the storage ports and the scheduler.

pub mod definitions;
pub mod runs;
pub mod triggers;

pub use definitions::DefinitionService;
pub use runs::{RunController, StartRun};
pub use triggers::{InboundMessageEvent, NewEntityEvent, StageChangeEvent, TriggerEvaluator, TriggerOutcome};
