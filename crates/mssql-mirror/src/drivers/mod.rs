//! Database driver implementations.
//!
//! Only SQL Server is supported; the driver provides the live
//! [`CatalogReader`](crate::core::traits::CatalogReader) and the T-SQL
//! statement dialect.

pub mod mssql;

pub use mssql::MssqlReader;
