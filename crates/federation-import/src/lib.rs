//! # Federation Import
//!
//! The reverse direction of federation: resolve an external reference to a
//! protocol, fetch the remote object through that protocol's adapter, and
//! upsert it into the canonical store under a deterministic derived id.
//!
//! ## Principles
//!
//! - **Imports are idempotent** - the derived id keys the row, so importing
//!   the same reference twice updates in place
//! - **Imports stay silent** - the upsert bypasses the change feed and the
//!   origin mapping is recorded `synced`, so imported content never
//!   federates back to where it came from
//! - **Reply links need a known parent** - a remote reply threads locally
//!   only when the parent's mapping already exists; otherwise it imports as
//!   a top-level item

pub mod error;
pub mod importer;

pub use error::{ImportError, ImportResult};
pub use importer::{derived_content_id, resolve, Importer};
