//! # federation-store
//!
//! SQLite persistence for canonical content and federation mappings.
//!
//! ## Principles
//!
//! 1. **Mappings are never deleted**: a remote delete produces a tombstoned
//!    row, so reverse lookups and audit history survive the content.
//! 2. **One row per (content, protocol)**: the primary key enforces the
//!    at-most-one live mapping rule.
//! 3. **Events after commit**: content mutations reach the change feed only
//!    once the row is on disk, so a crash can at worst replay, never lose.
//!
//! ## Crate Structure
//!
//! - `db`: connection handling and query operations
//! - `models`: mapping row and status types
//! - `migrations`: versioned schema migrations
//! - `error`: store error types

pub mod db;
pub mod error;
pub mod migrations;
pub mod models;

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use models::{FederationMapping, MappingStatus, StatusCounts};
