//! Local store trait definition.

use crate::error::StoreResult;
use crate::path::StoragePath;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidesync_protocol::{Attributes, RecordId, Timestamp};

/// A record as held by a [`LocalStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Storage path the record lives under.
    pub storage_path: StoragePath,
    /// Identifier within the storage path.
    pub identifier: RecordId,
    /// Current field values.
    pub attributes: Attributes,
    /// `updated_at` of the remote version last written here.
    pub updated_at: Timestamp,
}

/// Local persistence as seen by the sync engine.
///
/// Stores group records by [`StoragePath`]. The engine asks for the highest
/// `updated_at` under a path to build its watermark, then creates, updates
/// or deletes individual records.
///
/// # Invariants
///
/// - `max_updated` reflects only records currently stored under the path
/// - Writes to the same path never interleave
/// - Implementations must be `Send + Sync`: concurrent entity passes share one store
pub trait LocalStore: Send + Sync {
    /// Returns the highest `updated_at` under `path`, or `None` if it is empty.
    fn max_updated(&self, path: &StoragePath) -> StoreResult<Option<Timestamp>>;

    /// Looks up a record by identifier.
    fn find(&self, path: &StoragePath, id: &RecordId) -> StoreResult<Option<LocalRecord>>;

    /// Creates a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the identifier is taken, or an I/O error from the backing medium.
    fn create(
        &self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord>;

    /// Replaces the attributes of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// record has disappeared since it was read.
    fn update(
        &self,
        record: &LocalRecord,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord>;

    /// Removes a record. Removing an absent record is not an error.
    fn delete(&self, record: &LocalRecord) -> StoreResult<()>;

    /// Number of records under `path`.
    fn count(&self, path: &StoragePath) -> StoreResult<usize>;

    /// All records under `path`, ordered by identifier.
    fn records(&self, path: &StoragePath) -> StoreResult<Vec<LocalRecord>>;
}

impl<S: LocalStore + ?Sized> LocalStore for Arc<S> {
    fn max_updated(&self, path: &StoragePath) -> StoreResult<Option<Timestamp>> {
        (**self).max_updated(path)
    }

    fn find(&self, path: &StoragePath, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        (**self).find(path, id)
    }

    fn create(
        &self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        (**self).create(path, id, attributes, updated_at)
    }

    fn update(
        &self,
        record: &LocalRecord,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        (**self).update(record, attributes, updated_at)
    }

    fn delete(&self, record: &LocalRecord) -> StoreResult<()> {
        (**self).delete(record)
    }

    fn count(&self, path: &StoragePath) -> StoreResult<usize> {
        (**self).count(path)
    }

    fn records(&self, path: &StoragePath) -> StoreResult<Vec<LocalRecord>> {
        (**self).records(path)
    }
}
