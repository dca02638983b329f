//! CRM Workflow Automation Engine
//!
//! This crate runs configured automations against CRM records:
//!
//! - **Definitions**: a trigger plus ordered, typed steps
//! - **Runs**: one execution of a definition against a contact, deal or
//!   conversation, with its own collected data
//! - **Dispatch**: execute the current step, persist the transition, chain
//!   the next hop through a deferred scheduler
//! - **Triggers**: stage changes, new contacts and inbound messages start
//!   runs for every matching active definition
//!
//! ## Architecture
//!
//! The engine only sees narrow storage traits ([`store`]) and a
//! [`scheduler::Scheduler`]. Every hop of a run is a scheduled job; waits
//! are delayed jobs, so no task ever sleeps inside a run. Definitions, runs
//! and the audit trail can live in memory or PostgreSQL ([`db`]).
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: PostgreSQL storage for definitions, runs and audit entries
//! - [`engine`]: Dispatcher, condition evaluator, placeholder rendering
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`scheduler`]: Deferred jobs and the worker loop
//! - [`services`]: Definition, run and trigger operations
//! - [`state`]: Shared application state
//! - [`steps`]: Step executors
//! - [`store`]: Storage ports and the in-memory store
//! - [`workflow`]: Definitions, runs and step configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crm_automation::{
//!     config::AppConfig,
//!     engine::StepDispatcher,
//!     scheduler::{JobRunner, TokioScheduler},
//!     state::AppState,
//!     steps::create_default_registry,
//!     store::{MemoryStore, Repositories},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repos = Repositories::in_memory(Arc::new(MemoryStore::new()));
//!     let (scheduler, jobs) = TokioScheduler::channel();
//!     let scheduler = Arc::new(scheduler);
//!     let registry = Arc::new(create_default_registry(&repos));
//!     let dispatcher = Arc::new(StepDispatcher::new(repos.clone(), registry, scheduler.clone()));
//!     tokio::spawn(JobRunner::new(jobs, dispatcher, 16).run(std::future::pending()));
//!     let state = AppState::new(AppConfig::default(), repos, scheduler, None);
//!     // ... build and run server
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod result_ext;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod steps;
pub mod store;
pub mod workflow;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
