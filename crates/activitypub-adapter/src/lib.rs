//! # activitypub-adapter
//!
//! Activity-protocol adapter: publishes canonical content as statuses on an
//! HTTP-addressed home instance and fetches remote objects as activity JSON.
//!
//! ## Crate Structure
//!
//! - `adapter`: the [`ProtocolAdapter`](federation_core::ProtocolAdapter)
//!   implementation
//! - `client`: instance REST client and error classification
//! - `convert`: pure status/object conversion in both directions

pub mod adapter;
pub mod client;
pub mod convert;

pub use adapter::ActivityProtocolAdapter;
pub use client::ActivityClient;
pub use convert::{ActivityObject, NewStatus, Status};
