//! # mssql-mirror
//!
//! Catalog diff and idempotent T-SQL script synthesis for SQL Server.
//!
//! The library compares a source database's catalog (live, or an offline
//! snapshot) with a target's and writes scripts that move the target toward
//! the source. Nothing is ever executed against the target.
//!
//! - **patch.sql**: drop foreign keys, tables and schemas the source lacks;
//!   add, drop and alter columns
//! - **create.sql**: create missing schemas, tables, indexes, table types
//!   and routines
//! - **seed.sql**: fill empty tables with source rows
//! - **update.sql**: upsert source rows into changed tables
//! - **alter.sql**: add constraints and foreign keys, replace routine bodies
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_mirror::{Config, Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> mssql_mirror::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let result = Orchestrator::new(config)?.run().await?;
//!     println!("Wrote {} scripts", result.scripts.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod ddl;
pub mod diff;
pub mod drivers;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod script;
pub mod selector;
pub mod snapshot;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, MirrorPolicy, ObjectFilter, OutputConfig, RoutinePolicy};
pub use core::{Catalog, CatalogData, CatalogReader, SqlValue};
pub use data::DataSet;
pub use diff::Patch;
pub use error::{MirrorError, Result};
pub use orchestrator::{HealthCheckResult, MirrorResult, Orchestrator};
pub use script::{Phase, Script};
pub use selector::Selection;
