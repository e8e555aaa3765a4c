//! In-memory store for testing.

use crate::error::StoreResult;
use crate::path::StoragePath;
use crate::store::{LocalRecord, LocalStore};
use crate::table::Table;
use parking_lot::RwLock;
use std::collections::HashMap;
use tidesync_protocol::{Attributes, RecordId, Timestamp};

/// An in-memory local store.
///
/// This store keeps all tables in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral caches that don't need persistence
///
/// # Thread Safety
///
/// All tables sit behind one `RwLock`, so writes are fully serialized and
/// reads may proceed in parallel.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<StoragePath, Table>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage paths that currently hold at least one record.
    #[must_use]
    pub fn paths(&self) -> Vec<StoragePath> {
        let mut paths: Vec<_> = self
            .tables
            .read()
            .iter()
            .filter(|(_, table)| table.len() > 0)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Drops every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

impl LocalStore for MemoryStore {
    fn max_updated(&self, path: &StoragePath) -> StoreResult<Option<Timestamp>> {
        Ok(self.tables.read().get(path).and_then(Table::max_updated))
    }

    fn find(&self, path: &StoragePath, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        Ok(self
            .tables
            .read()
            .get(path)
            .and_then(|table| table.find(path, id)))
    }

    fn create(
        &self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        self.tables
            .write()
            .entry(path.clone())
            .or_default()
            .insert(path, id, attributes, updated_at)
    }

    fn update(
        &self,
        record: &LocalRecord,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        let path = &record.storage_path;
        self.tables
            .write()
            .entry(path.clone())
            .or_default()
            .replace(path, &record.identifier, attributes, updated_at)
    }

    fn delete(&self, record: &LocalRecord) -> StoreResult<()> {
        if let Some(table) = self.tables.write().get_mut(&record.storage_path) {
            table.remove(&record.identifier);
        }
        Ok(())
    }

    fn count(&self, path: &StoragePath) -> StoreResult<usize> {
        Ok(self.tables.read().get(path).map_or(0, Table::len))
    }

    fn records(&self, path: &StoragePath) -> StoreResult<Vec<LocalRecord>> {
        Ok(self
            .tables
            .read()
            .get(path)
            .map(|table| table.records(path))
            .unwrap_or_default())
    }
}
