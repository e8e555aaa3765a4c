//! # TideSync Engine
//!
//! Watermark-driven synchronization of a local object store against a
//! remote server.
//!
//! This crate provides:
//! - An entity registry (sequential vs. concurrent entities)
//! - Per-entity watermarks computed from the local store
//! - Record reconciliation (create / update / delete / skip)
//! - A scheduler running sequential entities in order and concurrent
//!   entities on worker threads
//! - Lifecycle observers
//! - Mock and HTTP transports
//!
//! ## Sync model
//!
//! For every entity, the engine asks the store for the highest `updated_at`
//! it holds, fetches only records newer than that, and applies them with
//! last-write-wins semantics (the remote copy always wins). Nothing is
//! persisted by the engine itself: the store's contents are the sync state.
//!
//! ## Key Invariants
//!
//! - Sequential entities never overlap and run in registration order
//! - At most one pass per entity is active at any time
//! - A failed entity does not abort the run
//! - Runs are idempotent
//!
//! ## Example
//!
//! ```rust
//! use tidesync_engine::{MockTransport, SyncConfig, SyncEngine, SyncMode};
//! use tidesync_protocol::{Attributes, RemoteRecord};
//! use tidesync_store::MemoryStore;
//!
//! let engine = SyncEngine::new(SyncConfig::new(), MemoryStore::new(), MockTransport::new());
//! engine.register("accounts", "accounts", SyncMode::Sequential)?;
//! engine.register("tags", "tags", SyncMode::Concurrent)?;
//!
//! engine.transport().push_record(RemoteRecord::upsert("tags", "t1", 10, Attributes::new()));
//!
//! let run = engine.sync()?;
//! assert!(run.is_completed());
//! assert_eq!(run.totals().created, 1);
//! # Ok::<(), tidesync_engine::SyncError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod observer;
mod reconciler;
mod registry;
mod run;
mod scheduler;
mod transport;
mod watermark;

pub use config::{Parallelism, RunMode, SyncConfig, SyncOptions};
pub use engine::{EngineStats, SyncEngine};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport};
pub use observer::{CallbackObserver, ObserverNotifier, SyncObserver, TracingObserver};
pub use reconciler::{ReconcilePlan, RecordAction, RecordReconciler};
pub use registry::{EntityDescriptor, EntityRegistry, ManifestEntry, RegistryManifest, SyncMode};
pub use run::{
    ActionCounts, EntityFailure, EntityOutcome, RejectedRecord, RunOutcome, SyncRun,
};
pub use scheduler::{ActivePasses, SyncScheduler};
pub use transport::{MockTransport, RemoteTransport};
pub use watermark::{SyncWatermark, WatermarkTracker};
