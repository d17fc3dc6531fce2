//! # Federation Dispatch
//!
//! The sync dispatcher: turns content change events into remote protocol
//! calls through a fixed worker pool, with per-content ordering, exponential
//! retry, and reply deferral.
//!
//! ## Principles
//!
//! - **Mapping state is the ledger** - every attempt lands in the mapping
//!   table before the worker moves on, so the in-memory queue is disposable
//! - **One content item, one worker** - jobs for the same content id run in
//!   arrival order; different items run concurrently
//! - **Protocols fail independently** - a dead network retries on its own
//!   narrowed job without blocking the other protocols
//!
//! ## Crate Structure
//!
//! - [`queue`] - Per-content FIFO with single-owner scheduling
//! - [`dispatcher`] - Worker pool, retry state machine, reply deferral
//! - [`error`] - Dispatcher error types

pub mod dispatcher;
pub mod error;
pub mod queue;

pub use dispatcher::{DispatcherConfig, SharedDatabase, SyncDispatcher};
pub use error::{DispatchError, DispatchResult};
pub use queue::JobQueue;
