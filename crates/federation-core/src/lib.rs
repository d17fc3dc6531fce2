//! # Federation Core
//!
//! Shared model and contracts for the federation synchronization engine:
//! the canonical content types, the protocol adapter boundary, the job and
//! change-event shapes, and daemon configuration.
//!
//! ## Principles
//!
//! - **Canonical content is locally authoritative** - remote networks hold
//!   derived copies, never the source of truth
//! - **Adapters classify every failure** - the dispatcher only ever sees
//!   transient, permanent, or not-found
//! - **Conversion loss is a warning, not an error** - a protocol that cannot
//!   carry an embed drops it and reports the drop
//! - **Events reflect committed reality** - the change feed fires after the
//!   store commit, at least once
//!
//! ## Crate Structure
//!
//! - [`types`] - Canonical content model and protocol enum
//! - [`adapter`] - The [`ProtocolAdapter`] contract and error taxonomy
//! - [`job`] - Dispatcher work items
//! - [`event`] - Change-feed contracts and test sinks
//! - [`config`] - Daemon configuration
//! - [`paths`] - Runtime file locations
//! - [`logging`] - Tracing setup

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod logging;
pub mod paths;
pub mod types;

pub use adapter::{
    AdapterError, AdapterResult, ContentDraft, FetchedContent, ProtocolAdapter, PublishReceipt,
    RemoteRef, UpdateReceipt,
};
pub use config::{ActivityProtocolConfig, FederationConfig, RepoProtocolConfig};
pub use error::{CoreError, CoreResult};
pub use event::{ContentEvent, ContentEventSink, NullSink, RecordingSink};
pub use job::{FederationJob, JobOperation};
pub use logging::init_logging;
pub use paths::Paths;
pub use types::{
    AuthorId, CanonicalContent, ContentId, ContentUpdate, Embed, EmbedKind, NewContent, Protocol,
};
