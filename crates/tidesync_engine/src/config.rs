//! Configuration for the sync engine.

use tidesync_protocol::EntityPayload;

const FALLBACK_PARALLEL_PASSES: usize = 4;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound on concurrent entity passes running at once.
    pub max_parallel_passes: usize,
    /// Whether fetched records are applied in ascending `updated_at` order.
    ///
    /// With this off, records are applied in the order the transport returned
    /// them, and a failure may leave an unapplied record below the stored
    /// maximum, where the next fetch no longer reaches it.
    pub sort_by_updated: bool,
}

impl SyncConfig {
    /// Creates a configuration sized to the machine's parallelism.
    pub fn new() -> Self {
        let max_parallel_passes = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_PARALLEL_PASSES);
        Self {
            max_parallel_passes,
            sort_by_updated: true,
        }
    }

    /// Sets the maximum number of concurrent passes (at least one).
    pub fn with_max_parallel_passes(mut self, passes: usize) -> Self {
        self.max_parallel_passes = passes.max(1);
        self
    }

    /// Sets whether records are sorted by `updated_at` before reconciliation.
    pub fn with_sort_by_updated(mut self, sort: bool) -> Self {
        self.sort_by_updated = sort;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a run gets its records from.
#[derive(Debug, Clone, Default)]
pub enum RunMode {
    /// Every registered entity: watermark, fetch, reconcile.
    #[default]
    RegistryDriven,
    /// Only the entities in the bundle, reconciled from the given records.
    /// Neither the transport nor the watermarks are consulted.
    Explicit(EntityPayload),
}

/// How concurrent entities are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parallelism {
    /// Concurrent entities run on worker threads.
    #[default]
    Declared,
    /// Everything runs on the calling thread; concurrent entities follow the
    /// sequential ones in registration order.
    Serial,
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Record source.
    pub mode: RunMode,
    /// Execution strategy for concurrent entities.
    pub parallelism: Parallelism,
}

impl SyncOptions {
    /// A full pull over the registry.
    pub fn registry_driven() -> Self {
        Self::default()
    }

    /// Applies a caller-supplied bundle.
    pub fn explicit(payload: EntityPayload) -> Self {
        Self {
            mode: RunMode::Explicit(payload),
            parallelism: Parallelism::Declared,
        }
    }

    /// Sets the parallelism.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Shorthand for `with_parallelism(Parallelism::Serial)`.
    pub fn serial(self) -> Self {
        self.with_parallelism(Parallelism::Serial)
    }

    /// Returns true for [`RunMode::Explicit`].
    pub fn is_explicit(&self) -> bool {
        matches!(self.mode, RunMode::Explicit(_))
    }
}
