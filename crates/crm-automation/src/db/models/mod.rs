//! Row types for the PostgreSQL tables.
//!
//! Rows keep enums as text and documents as JSONB; conversion to the
//! domain types validates both.

mod audit;
mod definition;
mod run;

pub use audit::AuditRow;
pub use definition::DefinitionRow;
pub use run::RunRow;
