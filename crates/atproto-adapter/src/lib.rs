//! # atproto-adapter
//!
//! Repository-protocol adapter: publishes canonical content as
//! content-addressed records (`at://{did}/{collection}/{rkey}`) via XRPC
//! calls against a configured service.
//!
//! ## Crate Structure
//!
//! - `adapter`: the [`ProtocolAdapter`](federation_core::ProtocolAdapter)
//!   implementation
//! - `client`: XRPC client and error classification
//! - `convert`: pure record conversion in both directions
//! - `uri`: `at://` URI parsing

pub mod adapter;
pub mod client;
pub mod convert;
pub mod uri;

pub use adapter::RepoProtocolAdapter;
pub use client::RepoClient;
pub use convert::{PostRecord, POST_RECORD_TYPE};
pub use uri::AtUri;
