//! Microsoft SQL Server driver.
//!
//! - [`MssqlReader`]: catalog and row reader over Tiberius
//! - [`dialect`]: T-SQL statement renderers used by every phase

pub mod dialect;
mod queries;
mod reader;

pub use reader::MssqlReader;
