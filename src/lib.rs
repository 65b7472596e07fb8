//! Schema-aware bulk reset tooling for SQLite databases.
//!
//! `db-reset` seeds and wipes a case-management database between
//! environments. It discovers the live foreign-key graph instead of
//! hard-coding it, lifts the constraints around destructive bulk work and
//! puts them back afterwards, and deletes dependent rows in an order that
//! never trips referential integrity.
//!
//! # Operations
//!
//! | Operation | Entry point | Effect |
//! |-----------|-------------|--------|
//! | **Full reset** | [`reset::run_full_reset`] | Drop every FK, empty every table, recreate and verify the FKs |
//! | **Selective reset** | [`reset::SelectiveReset`] | Delete a root row set and every row that depends on it |
//! | **Purge** | [`reset::BatchedBulkDeleter`] | Page through one table deleting rows by filter |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: Connection setup, catalog introspection, DDL editing and table rebuilds
//! - [`reset`]: Reset engine: constraint lifecycle, truncation, planning and batched deletes

pub mod config;
pub mod db;
pub mod reset;
