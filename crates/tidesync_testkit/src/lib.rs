//! # TideSync Testkit
//!
//! Test utilities for TideSync.
//!
//! This crate provides:
//! - Record and registry fixtures
//! - A recording observer
//! - Fault-injecting store and transport wrappers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tidesync_testkit::prelude::*;
//!
//! let engine = memory_engine(accounts_and_tags());
//! let observer = Arc::new(RecordingObserver::new());
//! engine.add_observer(observer.clone());
//!
//! engine.transport().push_record(record("tags", "t1", 1));
//! engine.sync().unwrap();
//!
//! assert_eq!(observer.entity_starts(), vec!["accounts", "tags"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
