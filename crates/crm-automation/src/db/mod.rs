//! Database module for the automation server.
//!
//! PostgreSQL storage for definitions, runs and the audit log, using SQLx.

pub mod models;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod store;

pub use pool::{create_pool, health_check, DbPool};
pub use store::PgStore;
