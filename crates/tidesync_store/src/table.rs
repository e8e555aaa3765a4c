//! Per-path record table shared by the store implementations.

use crate::error::{StoreError, StoreResult};
use crate::path::StoragePath;
use crate::store::LocalRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tidesync_protocol::{Attributes, RecordId, Timestamp};

/// Records of one storage path, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    rows: BTreeMap<RecordId, Row>,
}

/// On-disk and in-memory form of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Row {
    pub(crate) id: RecordId,
    pub(crate) updated_at: Timestamp,
    pub(crate) attributes: Attributes,
}

impl Row {
    fn to_record(&self, path: &StoragePath) -> LocalRecord {
        LocalRecord {
            storage_path: path.clone(),
            identifier: self.id.clone(),
            attributes: self.attributes.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl Table {
    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.id.clone(), row)).collect(),
        }
    }

    pub(crate) fn rows(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn max_updated(&self) -> Option<Timestamp> {
        self.rows.values().map(|row| row.updated_at).max()
    }

    pub(crate) fn find(&self, path: &StoragePath, id: &RecordId) -> Option<LocalRecord> {
        self.rows.get(id).map(|row| row.to_record(path))
    }

    pub(crate) fn records(&self, path: &StoragePath) -> Vec<LocalRecord> {
        self.rows.values().map(|row| row.to_record(path)).collect()
    }

    pub(crate) fn insert(
        &mut self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        if self.rows.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
                id: id.to_string(),
            });
        }
        let row = Row {
            id: id.clone(),
            updated_at,
            attributes: attributes.clone(),
        };
        let record = row.to_record(path);
        self.rows.insert(id.clone(), row);
        Ok(record)
    }

    pub(crate) fn replace(
        &mut self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        let row = self.rows.get_mut(id).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
            id: id.to_string(),
        })?;
        row.attributes = attributes.clone();
        row.updated_at = updated_at;
        Ok(row.to_record(path))
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> bool {
        self.rows.remove(id).is_some()
    }
}
