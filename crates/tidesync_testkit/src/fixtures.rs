//! Test fixtures.
//!
//! Observers that record what they see, stores and transports with
//! injectable faults, and helpers for the common test scenarios.

use parking_lot::{Condvar, Mutex};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tidesync_engine::{
    EntityOutcome, EntityRegistry, MockTransport, RecordAction, RemoteTransport, SyncConfig,
    SyncEngine, SyncMode, SyncObserver, SyncResult, SyncRun,
};
use tidesync_protocol::{Attributes, RecordId, RemoteRecord, Timestamp};
use tidesync_store::{
    FileStore, LocalRecord, LocalStore, MemoryStore, StoragePath, StoreError, StoreResult,
};

/// Builds attributes from key/value pairs.
pub fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A live record whose only attribute is `rev`, set to the timestamp.
pub fn record(entity: &str, id: &str, updated_at: i64) -> RemoteRecord {
    RemoteRecord::upsert(entity, id, updated_at, attrs(&[("rev", json!(updated_at))]))
}

/// A deletion marker.
pub fn tombstone(entity: &str, id: &str, updated_at: i64) -> RemoteRecord {
    RemoteRecord::tombstone(entity, id, updated_at)
}

/// Parses a storage path, panicking on invalid input.
pub fn storage_path(path: &str) -> StoragePath {
    StoragePath::new(path).expect("Invalid storage path")
}

/// The registry used throughout the docs: `accounts` sequential under
/// `ledger/accounts`, `tags` concurrent under `meta/tags`.
pub fn accounts_and_tags() -> EntityRegistry {
    EntityRegistry::new()
        .with("accounts", "ledger/accounts", SyncMode::Sequential)
        .and_then(|r| r.with("tags", "meta/tags", SyncMode::Concurrent))
        .expect("Invalid fixture registry")
}

/// An engine over a fresh [`MemoryStore`] and [`MockTransport`].
pub fn memory_engine(registry: EntityRegistry) -> SyncEngine<MemoryStore, MockTransport> {
    SyncEngine::with_registry(
        SyncConfig::new(),
        MemoryStore::new(),
        MockTransport::new(),
        registry,
    )
}

/// A [`FileStore`] in a temporary directory, removed on drop.
pub struct TempFileStore {
    /// The store.
    pub store: FileStore,
    dir: TempDir,
}

impl TempFileStore {
    /// Creates an empty store in a new temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(dir.path(), true).expect("Failed to open file store");
        Self { store, dir }
    }

    /// The store's root directory.
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Closes the store and opens it again from disk.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = FileStore::open(dir.path(), false).expect("Failed to reopen file store");
        Self { store, dir }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// One observed lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    /// `on_run_start`
    RunStart,
    /// `on_run_end`
    RunEnd {
        /// Whether the run completed without failures.
        completed: bool,
    },
    /// `on_sequential_start`
    SequentialStart(Vec<String>),
    /// `on_sequential_end`
    SequentialEnd(Vec<String>),
    /// `on_entity_start`
    EntityStart(String),
    /// `on_entity_end`
    EntityEnd {
        /// Entity name.
        entity: String,
        /// Whether the pass succeeded.
        success: bool,
    },
    /// `on_element_start`
    ElementStart {
        /// Entity name.
        entity: String,
        /// Record identifier.
        id: String,
        /// Planned action.
        action: RecordAction,
    },
    /// `on_element_end`
    ElementEnd {
        /// Entity name.
        entity: String,
        /// Record identifier.
        id: String,
        /// Action taken.
        action: RecordAction,
    },
}

/// Records every callback in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Entity names from `on_entity_start`, in order.
    pub fn entity_starts(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::EntityStart(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(entity, success)` from `on_entity_end`, in order.
    pub fn entity_ends(&self) -> Vec<(String, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::EntityEnd { entity, success } => Some((entity.clone(), *success)),
                _ => None,
            })
            .collect()
    }

    /// `(id, action)` from `on_element_end` for one entity, in order.
    pub fn elements(&self, entity_name: &str) -> Vec<(String, RecordAction)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::ElementEnd { entity, id, action } if entity == entity_name => {
                    Some((id.clone(), *action))
                }
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().push(event);
    }
}

impl SyncObserver for RecordingObserver {
    fn on_run_start(&self) {
        self.push(ObservedEvent::RunStart);
    }

    fn on_run_end(&self, run: &SyncRun) {
        self.push(ObservedEvent::RunEnd {
            completed: run.is_completed(),
        });
    }

    fn on_sequential_start(&self, entities: &[String]) {
        self.push(ObservedEvent::SequentialStart(entities.to_vec()));
    }

    fn on_sequential_end(&self, entities: &[String]) {
        self.push(ObservedEvent::SequentialEnd(entities.to_vec()));
    }

    fn on_entity_start(&self, entity: &str) {
        self.push(ObservedEvent::EntityStart(entity.to_string()));
    }

    fn on_entity_end(&self, entity: &str, outcome: &EntityOutcome) {
        self.push(ObservedEvent::EntityEnd {
            entity: entity.to_string(),
            success: outcome.is_success(),
        });
    }

    fn on_element_start(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        self.push(ObservedEvent::ElementStart {
            entity: entity.to_string(),
            id: record.identifier.to_string(),
            action,
        });
    }

    fn on_element_end(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        self.push(ObservedEvent::ElementEnd {
            entity: entity.to_string(),
            id: record.identifier.to_string(),
            action,
        });
    }
}

/// Wraps a store and rejects selected writes.
///
/// Reads always pass through. A rejected write returns
/// [`StoreError::WriteRejected`] and leaves the inner store untouched.
pub struct FaultyStore<S: LocalStore> {
    inner: S,
    rejected_paths: Mutex<HashSet<String>>,
    rejected_ids: Mutex<HashSet<String>>,
    write_budget: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl<S: LocalStore> FaultyStore<S> {
    /// Wraps `inner` with no faults configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rejected_paths: Mutex::new(HashSet::new()),
            rejected_ids: Mutex::new(HashSet::new()),
            write_budget: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Rejects every write under `path`.
    pub fn reject_path(&self, path: &str) {
        self.rejected_paths.lock().insert(path.to_string());
    }

    /// Rejects writes of the record with identifier `id` (any path).
    pub fn reject_record(&self, id: &str) {
        self.rejected_ids.lock().insert(id.to_string());
    }

    /// Allows `n` more successful writes, then rejects all of them.
    pub fn fail_after_writes(&self, n: usize) {
        *self.write_budget.lock() = Some(n);
    }

    /// Removes every configured fault.
    pub fn heal(&self) {
        self.rejected_paths.lock().clear();
        self.rejected_ids.lock().clear();
        *self.write_budget.lock() = None;
    }

    /// Number of writes that reached the inner store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, path: &StoragePath, id: &RecordId) -> StoreResult<()> {
        if self.rejected_paths.lock().contains(path.as_str()) {
            return Err(StoreError::WriteRejected(format!("path '{}' is read-only", path)));
        }
        if self.rejected_ids.lock().contains(id.as_str()) {
            return Err(StoreError::WriteRejected(format!("record '{}' is poisoned", id)));
        }
        let mut budget = self.write_budget.lock();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::WriteRejected("write budget exhausted".into()));
            }
            *remaining -= 1;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<S: LocalStore> LocalStore for FaultyStore<S> {
    fn max_updated(&self, path: &StoragePath) -> StoreResult<Option<Timestamp>> {
        self.inner.max_updated(path)
    }

    fn find(&self, path: &StoragePath, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        self.inner.find(path, id)
    }

    fn create(
        &self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        self.check(path, id)?;
        self.inner.create(path, id, attributes, updated_at)
    }

    fn update(
        &self,
        record: &LocalRecord,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        self.check(&record.storage_path, &record.identifier)?;
        self.inner.update(record, attributes, updated_at)
    }

    fn delete(&self, record: &LocalRecord) -> StoreResult<()> {
        self.check(&record.storage_path, &record.identifier)?;
        self.inner.delete(record)
    }

    fn count(&self, path: &StoragePath) -> StoreResult<usize> {
        self.inner.count(path)
    }

    fn records(&self, path: &StoragePath) -> StoreResult<Vec<LocalRecord>> {
        self.inner.records(path)
    }
}

#[derive(Default)]
struct GateState {
    closed: HashSet<String>,
    waiting: HashSet<String>,
}

/// A transport whose fetches can be held open per entity.
///
/// Used to keep a pass in flight while a test starts a second run or checks
/// that concurrent entities really overlap.
pub struct GatedTransport<T: RemoteTransport> {
    inner: T,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl<T: RemoteTransport> GatedTransport<T> {
    /// Wraps `inner` with every gate open.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Makes fetches of `entity` block until [`open`](Self::open).
    pub fn close(&self, entity: &str) {
        self.state.lock().closed.insert(entity.to_string());
    }

    /// Releases fetches of `entity`.
    pub fn open(&self, entity: &str) {
        self.state.lock().closed.remove(entity);
        self.changed.notify_all();
    }

    /// Waits until a fetch of `entity` is blocked on its gate.
    ///
    /// Returns false on timeout.
    pub fn wait_until_blocked(&self, entity: &str, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        while !state.waiting.contains(entity) {
            if self.changed.wait_for(&mut state, timeout).timed_out() {
                return state.waiting.contains(entity);
            }
        }
        true
    }
}

impl<T: RemoteTransport> RemoteTransport for GatedTransport<T> {
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        {
            let mut state = self.state.lock();
            if state.closed.contains(entity_name) {
                state.waiting.insert(entity_name.to_string());
                self.changed.notify_all();
                while state.closed.contains(entity_name) {
                    self.changed.wait(&mut state);
                }
                state.waiting.remove(entity_name);
            }
        }
        self.inner.fetch(entity_name, since)
    }
}
