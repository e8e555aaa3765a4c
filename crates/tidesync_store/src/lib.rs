//! # TideSync Store
//!
//! Local store trait and reference implementations for TideSync.
//!
//! The sync engine never touches persistence directly. It talks to a
//! [`LocalStore`], which keeps records grouped by [`StoragePath`] and knows
//! the `updated_at` of each record so it can report a watermark.
//!
//! ## Design Principles
//!
//! - Stores are keyed by storage path, not by entity name
//! - Stores keep `updated_at` next to the attributes
//! - Must be `Send + Sync`; writes are serialized internally
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral use
//! - [`FileStore`] - One JSON file per storage path under a locked directory
//!
//! ## Example
//!
//! ```rust
//! use tidesync_store::{LocalStore, MemoryStore, StoragePath};
//! use tidesync_protocol::{Attributes, RecordId, Timestamp};
//!
//! let store = MemoryStore::new();
//! let path = StoragePath::new("accounts").unwrap();
//! store
//!     .create(&path, &RecordId::new("a-1"), &Attributes::new(), Timestamp::new(7))
//!     .unwrap();
//! assert_eq!(store.max_updated(&path).unwrap(), Some(Timestamp::new(7)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod path;
mod store;
mod table;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use path::StoragePath;
pub use store::{LocalRecord, LocalStore};
