//! # TideSync Protocol
//!
//! Record types and payload codecs for TideSync.
//!
//! This crate provides:
//! - [`Timestamp`], [`RecordId`] and [`Attributes`], the building blocks of a record
//! - [`RemoteRecord`], one record as delivered by the remote server
//! - [`EntityPayload`], a bundle of already-fetched records keyed by entity name
//! - JSON and CBOR payload decoding/encoding
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Raw record shape
//!
//! ```text
//! { "id": "a-1", "updated_at": 1700000000, "deleted": false, "name": "Checking" }
//! ```
//!
//! `id`, `updated_at` and `deleted` are envelope keys; every other key is an attribute.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod payload;
mod record;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use payload::PayloadFormat;
pub use record::{EntityPayload, RemoteRecord, DELETED_KEY, ID_KEY, UPDATED_AT_KEY};
pub use types::{Attributes, RecordId, Timestamp};
