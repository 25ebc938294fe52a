//! Moves whole tables between a relational store and per-table CSV files: schema-driven
//! import in independently committed batches, and streaming export into timestamped archives.

pub mod config;
pub mod database;
pub mod domains;
pub mod errors;
pub mod logging;

pub use config::MigrationConfig;
pub use errors::{DbError, DbResult, MigrationError, MigrationResult};
