//! Transport layer abstraction for fetching remote records.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidesync_protocol::{RemoteRecord, Timestamp};

/// Fetches records of one entity type from the remote side.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, files on disk, mock for testing, etc.).
pub trait RemoteTransport: Send + Sync {
    /// Returns the records of `entity_name` whose `updated_at` is strictly
    /// greater than `since`, or every record when `since` is `None`.
    ///
    /// Implementations bound their own calls; the engine never times out a
    /// fetch.
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>>;
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for Arc<T> {
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        (**self).fetch(entity_name, since)
    }
}

/// A scripted transport for testing.
///
/// Holds a record list per entity and serves the part above `since`.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    records: Mutex<HashMap<String, Vec<RemoteRecord>>>,
    failures: Mutex<HashMap<String, SyncError>>,
    fetch_log: Mutex<Vec<(String, Option<Timestamp>)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected transport with no records.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            records: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the records served for an entity.
    pub fn set_records(&self, entity_name: &str, records: Vec<RemoteRecord>) {
        self.records.lock().insert(entity_name.to_string(), records);
    }

    /// Adds one record to the records served for its entity.
    pub fn push_record(&self, record: RemoteRecord) {
        self.records
            .lock()
            .entry(record.entity_name.clone())
            .or_default()
            .push(record);
    }

    /// Makes every fetch of `entity_name` fail with `error`.
    pub fn fail_entity(&self, entity_name: &str, error: SyncError) {
        self.failures.lock().insert(entity_name.to_string(), error);
    }

    /// Removes an injected failure.
    pub fn clear_failure(&self, entity_name: &str) {
        self.failures.lock().remove(entity_name);
    }

    /// Sets the connected state. A disconnected transport fails every fetch
    /// with a retryable error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Every fetch so far as `(entity, since)`, in call order.
    pub fn fetch_log(&self) -> Vec<(String, Option<Timestamp>)> {
        self.fetch_log.lock().clone()
    }

    /// Number of fetches made for an entity.
    pub fn fetch_count(&self, entity_name: &str) -> usize {
        self.fetch_log
            .lock()
            .iter()
            .filter(|(name, _)| name == entity_name)
            .count()
    }
}

fn replay(error: &SyncError) -> SyncError {
    match error {
        SyncError::Transport { message, retryable } => SyncError::Transport {
            message: message.clone(),
            retryable: *retryable,
        },
        SyncError::Reconciliation(message) => SyncError::Reconciliation(message.clone()),
        SyncError::Configuration(message) => SyncError::Configuration(message.clone()),
        SyncError::PassInProgress(entity) => SyncError::PassInProgress(entity.clone()),
        SyncError::Storage(err) => SyncError::transport_fatal(err.to_string()),
    }
}

impl RemoteTransport for MockTransport {
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        self.fetch_log.lock().push((entity_name.to_string(), since));

        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }
        if let Some(error) = self.failures.lock().get(entity_name) {
            return Err(replay(error));
        }

        let records = self.records.lock();
        Ok(records
            .get(entity_name)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| since.map_or(true, |mark| r.updated_at > mark))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
