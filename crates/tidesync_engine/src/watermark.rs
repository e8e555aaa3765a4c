//! Per-entity high-water marks.

use crate::error::SyncResult;
use crate::registry::EntityDescriptor;
use tidesync_protocol::Timestamp;
use tidesync_store::LocalStore;

/// The highest `updated_at` held locally for one entity.
///
/// Recomputed from the store at the start of every pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWatermark {
    /// Entity the watermark belongs to.
    pub entity_name: String,
    /// Maximum local `updated_at`; `None` if nothing is stored yet.
    pub max_updated: Option<Timestamp>,
}

impl SyncWatermark {
    /// Returns true if a record with `updated_at` lies strictly above the mark.
    pub fn admits(&self, updated_at: Timestamp) -> bool {
        self.max_updated.map_or(true, |mark| updated_at > mark)
    }
}

/// Reads watermarks from a [`LocalStore`]. Read-only.
pub struct WatermarkTracker<'a, S: LocalStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: LocalStore + ?Sized> WatermarkTracker<'a, S> {
    /// Creates a tracker over `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Computes the watermark for an entity from its storage path.
    pub fn max_updated(&self, descriptor: &EntityDescriptor) -> SyncResult<SyncWatermark> {
        let max_updated = self.store.max_updated(descriptor.storage_path())?;
        Ok(SyncWatermark {
            entity_name: descriptor.name().to_string(),
            max_updated,
        })
    }
}
