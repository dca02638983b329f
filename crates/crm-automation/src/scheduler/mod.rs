//! Deferred job scheduling.
//!
//! The engine never blocks on a timer. Every hop of a run is a [`Job`]
//! handed to a [`Scheduler`]: zero delay to chain steps, the wait duration
//! to resume after a `wait` step. Delivery is at-least-once; handlers
//! re-check run state on every invocation.

pub mod recording;
pub mod runner;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

pub use recording::RecordingScheduler;
pub use runner::{JobRunner, TokioScheduler};

/// Unit of deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Execute the run's current step.
    Dispatch { run_id: Uuid },
    /// Move a run past the wait step it is suspended on.
    Continue { run_id: Uuid },
}

impl Job {
    pub fn run_id(&self) -> Uuid {
        match self {
            Job::Dispatch { run_id } | Job::Continue { run_id } => *run_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::Dispatch { .. } => "dispatch",
            Job::Continue { .. } => "continue",
        }
    }
}

/// "Invoke after delay, at-least-once."
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, delay: Duration, job: Job) -> AppResult<()>;
}

/// Consumer of scheduled jobs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job);
}
