//! SQL queries, one module per table.

pub mod audit;
pub mod definition;
pub mod run;
