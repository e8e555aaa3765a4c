//! The engine facade.

use crate::config::{SyncConfig, SyncOptions};
use crate::error::{SyncError, SyncResult};
use crate::observer::{ObserverNotifier, SyncObserver};
use crate::registry::{EntityDescriptor, EntityRegistry, SyncMode};
use crate::run::{ActionCounts, SyncRun};
use crate::scheduler::{ActivePasses, SyncScheduler};
use crate::transport::RemoteTransport;
use crate::watermark::{SyncWatermark, WatermarkTracker};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tidesync_protocol::EntityPayload;
use tidesync_store::LocalStore;

/// Counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Runs where every entity succeeded.
    pub runs_completed: u64,
    /// Runs where at least one entity failed.
    pub runs_partially_failed: u64,
    /// Actions summed over all runs.
    pub totals: ActionCounts,
    /// Failed entity passes over all runs.
    pub entity_failures: u64,
    /// When the last run finished.
    pub last_run_time: Option<Instant>,
    /// Last entity failure or run error message.
    pub last_error: Option<String>,
}

/// Synchronizes a local store against a remote transport.
///
/// The engine owns the entity registry and the observers. Each run works on
/// a snapshot of the registry taken when the run starts, so registering
/// entities while a run is in flight affects only later runs.
///
/// Runs may overlap (from different threads); an entity that already has a
/// pass in flight is reported as [`SyncError::PassInProgress`] by the
/// later run instead of being reconciled twice.
pub struct SyncEngine<S: LocalStore, T: RemoteTransport> {
    config: SyncConfig,
    store: S,
    transport: T,
    registry: RwLock<EntityRegistry>,
    notifier: ObserverNotifier,
    active: ActivePasses,
    stats: RwLock<EngineStats>,
}

impl<S: LocalStore, T: RemoteTransport> SyncEngine<S, T> {
    /// Creates an engine with an empty registry.
    pub fn new(config: SyncConfig, store: S, transport: T) -> Self {
        Self::with_registry(config, store, transport, EntityRegistry::new())
    }

    /// Creates an engine with a prepared registry.
    pub fn with_registry(
        config: SyncConfig,
        store: S,
        transport: T,
        registry: EntityRegistry,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            registry: RwLock::new(registry),
            notifier: ObserverNotifier::new(),
            active: ActivePasses::new(),
            stats: RwLock::new(EngineStats::default()),
        }
    }

    /// Registers an entity type. See [`EntityRegistry::register`].
    pub fn register(
        &self,
        name: impl Into<String>,
        storage_path: &str,
        mode: SyncMode,
    ) -> SyncResult<()> {
        self.registry.write().register(name, storage_path, mode)
    }

    /// Registers a prepared descriptor. See
    /// [`EntityRegistry::register_descriptor`].
    pub fn register_descriptor(&self, descriptor: EntityDescriptor) -> SyncResult<()> {
        self.registry.write().register_descriptor(descriptor)
    }

    /// Appends an observer; observers are notified in the order added.
    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        self.notifier.add(observer);
    }

    /// Executes one run with the given options.
    ///
    /// # Errors
    ///
    /// Only [`SyncError::Configuration`]; entity failures are reported in the
    /// returned [`SyncRun`]. A run started from inside an observer callback
    /// is refused.
    pub fn run(&self, options: SyncOptions) -> SyncResult<SyncRun> {
        if self.notifier.is_dispatching() {
            return Err(SyncError::configuration(
                "sync run started from inside an observer callback",
            ));
        }
        let registry = self.registry.read().clone();
        let scheduler = SyncScheduler::new(
            &self.store,
            &self.transport,
            &self.notifier,
            &self.config,
            &self.active,
        );

        match scheduler.run(&registry, &options) {
            Ok(run) => {
                self.record(&run);
                Ok(run)
            }
            Err(err) => {
                self.stats.write().last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// A registry-driven run: every entity is pulled from the transport.
    pub fn sync(&self) -> SyncResult<SyncRun> {
        self.run(SyncOptions::registry_driven())
    }

    /// Applies a caller-supplied bundle without touching the transport.
    pub fn apply_payload(&self, payload: EntityPayload) -> SyncResult<SyncRun> {
        self.run(SyncOptions::explicit(payload))
    }

    fn record(&self, run: &SyncRun) {
        let mut stats = self.stats.write();
        if run.is_completed() {
            stats.runs_completed += 1;
        } else {
            stats.runs_partially_failed += 1;
        }
        stats.totals.merge(&run.totals());
        for (entity, failure) in run.failed() {
            stats.entity_failures += 1;
            stats.last_error = Some(format!("{}: {}", entity, failure.message));
        }
        stats.last_run_time = Some(Instant::now());
    }

    /// Current watermark of a registered entity.
    pub fn watermark(&self, entity_name: &str) -> SyncResult<SyncWatermark> {
        let descriptor = self
            .registry
            .read()
            .get(entity_name)
            .cloned()
            .ok_or_else(|| {
                SyncError::configuration(format!("entity '{}' is not registered", entity_name))
            })?;
        WatermarkTracker::new(&self.store).max_updated(&descriptor)
    }

    /// Gets the current stats.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Snapshot of the registry.
    pub fn registry(&self) -> EntityRegistry {
        self.registry.read().clone()
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
