//! Application state for the automation server.
//!
//! This module defines the shared application state that is
//! passed to all handlers via Axum's state management.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::scheduler::Scheduler;
use crate::services::{DefinitionService, RunController, TriggerEvaluator};
use crate::store::Repositories;

/// Shared application state.
///
/// Cheap to clone; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Definition management
    pub definitions: DefinitionService,

    /// Run lifecycle operations
    pub runs: RunController,

    /// Event entry points
    pub triggers: TriggerEvaluator,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Database connection pool, when the Postgres backend is in use
    pub db: Option<DbPool>,

    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the services over one set of repositories and one scheduler.
    pub fn new(
        config: AppConfig,
        repos: Repositories,
        scheduler: Arc<dyn Scheduler>,
        db: Option<DbPool>,
    ) -> Self {
        Self {
            definitions: DefinitionService::new(repos.definitions.clone()),
            runs: RunController::new(repos.clone(), scheduler.clone()),
            triggers: TriggerEvaluator::new(repos, scheduler),
            config: Arc::new(config),
            db,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }
}
