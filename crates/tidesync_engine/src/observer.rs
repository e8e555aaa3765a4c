//! Lifecycle observers.
//!
//! Observers implement [`SyncObserver`] and override only the callbacks they
//! care about; everything else defaults to a no-op. The engine fans each
//! event out to observers in registration order, one observer at a time.
//!
//! Event order for a run:
//!
//! ```text
//! run_start
//!   sequential_start([names])
//!     entity_start(a) element_start/element_end ... entity_end(a)
//!     entity_start(b) ...                           entity_end(b)
//!   sequential_end([names])
//!   entity_start(c) ... entity_end(c)   <- concurrent entities, any order
//! run_end(run)
//! ```

use crate::reconciler::RecordAction;
use crate::run::{EntityOutcome, SyncRun};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::cell::Cell;
use std::sync::Arc;
use tidesync_protocol::RemoteRecord;
use tracing::{debug, error, info, warn};

/// Receives sync lifecycle callbacks. Every method is optional.
///
/// Callbacks run on the thread doing the work (a worker thread for
/// concurrent entities) but never concurrently with another callback.
/// A callback must not start another run on the same engine: such a run is
/// refused with [`SyncError::Configuration`](crate::SyncError::Configuration).
#[allow(unused_variables)]
pub trait SyncObserver: Send + Sync {
    /// A run is starting.
    fn on_run_start(&self) {}

    /// A run finished.
    fn on_run_end(&self, run: &SyncRun) {}

    /// The sequential phase is starting with these entities, in order.
    fn on_sequential_start(&self, entities: &[String]) {}

    /// The sequential phase finished.
    fn on_sequential_end(&self, entities: &[String]) {}

    /// An entity pass is starting.
    fn on_entity_start(&self, entity: &str) {}

    /// An entity pass finished (successfully or not).
    fn on_entity_end(&self, entity: &str, outcome: &EntityOutcome) {}

    /// A record is about to be reconciled with the given planned action.
    fn on_element_start(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {}

    /// A record was reconciled.
    fn on_element_end(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {}
}

/// Ordered fan-out of events to registered observers.
///
/// Dispatch is serialized across threads. An event raised from inside a
/// callback on the same thread is dropped with an error log rather than
/// deadlocking.
#[derive(Default)]
pub struct ObserverNotifier {
    observers: RwLock<Vec<Arc<dyn SyncObserver>>>,
    dispatch: ReentrantMutex<Cell<bool>>,
}

/// Marks the owning thread as dispatching until dropped, unwinding included.
struct Dispatching<'a>(ReentrantMutexGuard<'a, Cell<bool>>);

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ObserverNotifier {
    /// Creates a notifier with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer.
    pub fn add(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Returns true if the calling thread is inside an observer callback.
    pub fn is_dispatching(&self) -> bool {
        self.dispatch.try_lock().map_or(false, |flag| flag.get())
    }

    fn notify(&self, event: impl Fn(&dyn SyncObserver)) {
        let observers = self.observers.read().clone();
        if observers.is_empty() {
            return;
        }
        let flag = self.dispatch.lock();
        if flag.replace(true) {
            error!("sync event raised from inside an observer callback; dropped");
            return;
        }
        let _dispatching = Dispatching(flag);
        for observer in &observers {
            event(observer.as_ref());
        }
    }

    pub(crate) fn run_start(&self) {
        self.notify(|o| o.on_run_start());
    }

    pub(crate) fn run_end(&self, run: &SyncRun) {
        self.notify(|o| o.on_run_end(run));
    }

    pub(crate) fn sequential_start(&self, entities: &[String]) {
        self.notify(|o| o.on_sequential_start(entities));
    }

    pub(crate) fn sequential_end(&self, entities: &[String]) {
        self.notify(|o| o.on_sequential_end(entities));
    }

    pub(crate) fn entity_start(&self, entity: &str) {
        self.notify(|o| o.on_entity_start(entity));
    }

    pub(crate) fn entity_end(&self, entity: &str, outcome: &EntityOutcome) {
        self.notify(|o| o.on_entity_end(entity, outcome));
    }

    pub(crate) fn element_start(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        self.notify(|o| o.on_element_start(entity, record, action));
    }

    pub(crate) fn element_end(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        self.notify(|o| o.on_element_end(entity, record, action));
    }
}

type RunFn = Box<dyn Fn() + Send + Sync>;
type RunEndFn = Box<dyn Fn(&SyncRun) + Send + Sync>;
type PhaseFn = Box<dyn Fn(&[String]) + Send + Sync>;
type EntityFn = Box<dyn Fn(&str) + Send + Sync>;
type EntityEndFn = Box<dyn Fn(&str, &EntityOutcome) + Send + Sync>;
type ElementFn = Box<dyn Fn(&str, &RemoteRecord, RecordAction) + Send + Sync>;

/// An observer assembled from optional closures.
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tidesync_engine::CallbackObserver;
///
/// let created = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&created);
/// let observer = CallbackObserver::new().on_element_end(move |_, _, action| {
///     if action == tidesync_engine::RecordAction::Created {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }
/// });
/// # let _ = observer;
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    run_start: Option<RunFn>,
    run_end: Option<RunEndFn>,
    sequential_start: Option<PhaseFn>,
    sequential_end: Option<PhaseFn>,
    entity_start: Option<EntityFn>,
    entity_end: Option<EntityEndFn>,
    element_start: Option<ElementFn>,
    element_end: Option<ElementFn>,
}

impl CallbackObserver {
    /// Creates an observer with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run-start callback.
    pub fn on_run_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.run_start = Some(Box::new(f));
        self
    }

    /// Sets the run-end callback.
    pub fn on_run_end(mut self, f: impl Fn(&SyncRun) + Send + Sync + 'static) -> Self {
        self.run_end = Some(Box::new(f));
        self
    }

    /// Sets the sequential-phase start callback.
    pub fn on_sequential_start(mut self, f: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.sequential_start = Some(Box::new(f));
        self
    }

    /// Sets the sequential-phase end callback.
    pub fn on_sequential_end(mut self, f: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.sequential_end = Some(Box::new(f));
        self
    }

    /// Sets the entity-start callback.
    pub fn on_entity_start(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.entity_start = Some(Box::new(f));
        self
    }

    /// Sets the entity-end callback.
    pub fn on_entity_end(
        mut self,
        f: impl Fn(&str, &EntityOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.entity_end = Some(Box::new(f));
        self
    }

    /// Sets the element-start callback.
    pub fn on_element_start(
        mut self,
        f: impl Fn(&str, &RemoteRecord, RecordAction) + Send + Sync + 'static,
    ) -> Self {
        self.element_start = Some(Box::new(f));
        self
    }

    /// Sets the element-end callback.
    pub fn on_element_end(
        mut self,
        f: impl Fn(&str, &RemoteRecord, RecordAction) + Send + Sync + 'static,
    ) -> Self {
        self.element_end = Some(Box::new(f));
        self
    }
}

impl SyncObserver for CallbackObserver {
    fn on_run_start(&self) {
        if let Some(f) = &self.run_start {
            f();
        }
    }

    fn on_run_end(&self, run: &SyncRun) {
        if let Some(f) = &self.run_end {
            f(run);
        }
    }

    fn on_sequential_start(&self, entities: &[String]) {
        if let Some(f) = &self.sequential_start {
            f(entities);
        }
    }

    fn on_sequential_end(&self, entities: &[String]) {
        if let Some(f) = &self.sequential_end {
            f(entities);
        }
    }

    fn on_entity_start(&self, entity: &str) {
        if let Some(f) = &self.entity_start {
            f(entity);
        }
    }

    fn on_entity_end(&self, entity: &str, outcome: &EntityOutcome) {
        if let Some(f) = &self.entity_end {
            f(entity, outcome);
        }
    }

    fn on_element_start(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        if let Some(f) = &self.element_start {
            f(entity, record, action);
        }
    }

    fn on_element_end(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        if let Some(f) = &self.element_end {
            f(entity, record, action);
        }
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_run_start(&self) {
        info!("sync run started");
    }

    fn on_run_end(&self, run: &SyncRun) {
        let totals = run.totals();
        info!(
            run_id = %run.run_id,
            outcome = ?run.outcome,
            created = totals.created,
            updated = totals.updated,
            deleted = totals.deleted,
            "sync run finished"
        );
    }

    fn on_sequential_start(&self, entities: &[String]) {
        debug!(?entities, "sequential phase started");
    }

    fn on_entity_start(&self, entity: &str) {
        debug!(entity, "entity started");
    }

    fn on_entity_end(&self, entity: &str, outcome: &EntityOutcome) {
        match &outcome.failure {
            None => debug!(entity, changes = outcome.counts.changes(), "entity finished"),
            Some(failure) => warn!(entity, error = %failure.message, "entity failed"),
        }
    }

    fn on_element_end(&self, entity: &str, record: &RemoteRecord, action: RecordAction) {
        debug!(entity, id = %record.identifier, %action, "element synchronized");
    }
}
