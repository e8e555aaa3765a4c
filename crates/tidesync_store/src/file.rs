//! File-backed store.
//!
//! Layout of a store directory:
//!
//! ```text
//! <root>/
//! ├─ LOCK                 # Advisory lock for single-writer
//! ├─ accounts.json        # One table per storage path
//! └─ finance/
//!    └─ ledger.json       # Nested paths map to subdirectories
//! ```
//!
//! Tables are loaded lazily and cached. Every write rewrites the whole table
//! file with a write-then-rename so a crash leaves either the old or the new
//! table on disk, never a torn one.

use crate::error::{StoreError, StoreResult};
use crate::path::StoragePath;
use crate::store::{LocalRecord, LocalStore};
use crate::table::{Row, Table};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tidesync_protocol::{Attributes, RecordId, Timestamp};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const TABLE_EXTENSION: &str = "json";
const TABLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    version: u32,
    records: Vec<Row>,
}

/// A local store persisted as JSON files under a locked directory.
///
/// # Thread Safety
///
/// The store holds an exclusive lock on its directory, so only one
/// `FileStore` (in any process) writes to it at a time. Inside the process,
/// table writes are serialized by an `RwLock`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    tables: RwLock<HashMap<StoragePath, Table>>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns [`StoreError::Locked`])
    /// - I/O errors occur
    pub fn open(root: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(StoreError::InvalidPath(format!(
                    "store directory does not exist: {}",
                    root.display()
                )));
            }
        }

        if !root.is_dir() {
            return Err(StoreError::InvalidPath(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(root.to_path_buf()));
        }

        debug!(root = %root.display(), "opened file store");

        Ok(Self {
            root: root.to_path_buf(),
            tables: RwLock::new(HashMap::new()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing a storage path.
    #[must_use]
    pub fn table_path(&self, path: &StoragePath) -> PathBuf {
        self.root.join(path.to_relative_file(TABLE_EXTENSION))
    }

    fn load_table(&self, path: &StoragePath) -> StoreResult<Table> {
        let file = self.table_path(path);
        if !file.exists() {
            return Ok(Table::default());
        }

        let data = fs::read(&file)?;
        if data.is_empty() {
            return Ok(Table::default());
        }

        let table: TableFile = serde_json::from_slice(&data)?;
        if table.version != TABLE_FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "{} has unsupported format version {}",
                file.display(),
                table.version
            )));
        }
        Ok(Table::from_rows(table.records))
    }

    fn save_table(&self, path: &StoragePath, table: &Table) -> StoreResult<()> {
        let file = self.table_path(path);
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let data = serde_json::to_vec_pretty(&TableFile {
            version: TABLE_FORMAT_VERSION,
            records: table.rows(),
        })?;

        let temp = file.with_extension("json.tmp");
        let mut out = File::create(&temp)?;
        out.write_all(&data)?;
        out.sync_all()?;
        drop(out);

        fs::rename(&temp, &file)?;
        sync_directory(&dir)?;

        debug!(path = %path, rows = table.len(), "saved table");
        Ok(())
    }

    /// Runs `f` against the cached table, loading it first if needed.
    fn read_table<R>(&self, path: &StoragePath, f: impl FnOnce(&Table) -> R) -> StoreResult<R> {
        if let Some(table) = self.tables.read().get(path) {
            return Ok(f(table));
        }

        let mut tables = self.tables.write();
        if !tables.contains_key(path) {
            let table = self.load_table(path)?;
            tables.insert(path.clone(), table);
        }
        match tables.get(path) {
            Some(table) => Ok(f(table)),
            None => Ok(f(&Table::default())),
        }
    }

    /// Applies `f` to a copy of the table, persists it, then swaps it in.
    ///
    /// If `f` or the write fails, the cached table is left untouched.
    fn write_table<R>(
        &self,
        path: &StoragePath,
        f: impl FnOnce(&mut Table) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut tables = self.tables.write();
        let mut table = match tables.get(path) {
            Some(table) => table.clone(),
            None => self.load_table(path)?,
        };

        let result = f(&mut table)?;
        self.save_table(path, &table)?;
        tables.insert(path.clone(), table);
        Ok(result)
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> StoreResult<()> {
    Ok(())
}

impl LocalStore for FileStore {
    fn max_updated(&self, path: &StoragePath) -> StoreResult<Option<Timestamp>> {
        self.read_table(path, Table::max_updated)
    }

    fn find(&self, path: &StoragePath, id: &RecordId) -> StoreResult<Option<LocalRecord>> {
        self.read_table(path, |table| table.find(path, id))
    }

    fn create(
        &self,
        path: &StoragePath,
        id: &RecordId,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        self.write_table(path, |table| table.insert(path, id, attributes, updated_at))
    }

    fn update(
        &self,
        record: &LocalRecord,
        attributes: &Attributes,
        updated_at: Timestamp,
    ) -> StoreResult<LocalRecord> {
        let path = &record.storage_path;
        self.write_table(path, |table| {
            table.replace(path, &record.identifier, attributes, updated_at)
        })
    }

    fn delete(&self, record: &LocalRecord) -> StoreResult<()> {
        self.write_table(&record.storage_path, |table| {
            table.remove(&record.identifier);
            Ok(())
        })
    }

    fn count(&self, path: &StoragePath) -> StoreResult<usize> {
        self.read_table(path, Table::len)
    }

    fn records(&self, path: &StoragePath) -> StoreResult<Vec<LocalRecord>> {
        self.read_table(path, |table| table.records(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn path(name: &str) -> StoragePath {
        StoragePath::new(name).unwrap()
    }

    #[test]
    fn file_open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        let store = FileStore::open(&root, true).unwrap();
        assert!(root.join(LOCK_FILE).exists());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn file_open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let result = FileStore::open(&dir.path().join("nope"), false);
        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path(), true).unwrap();
        let second = FileStore::open(dir.path(), true);
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let p = path("finance/accounts");
        let id = RecordId::new("a-1");
        let attrs: Attributes = [("name".to_string(), json!("Checking"))].into();

        {
            let store = FileStore::open(dir.path(), true).unwrap();
            store.create(&p, &id, &attrs, Timestamp::new(4)).unwrap();
            assert!(store.table_path(&p).exists());
        }

        let store = FileStore::open(dir.path(), false).unwrap();
        let record = store.find(&p, &id).unwrap().unwrap();
        assert_eq!(record.attributes, attrs);
        assert_eq!(store.max_updated(&p).unwrap(), Some(Timestamp::new(4)));
    }

    #[test]
    fn file_update_and_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path(), true).unwrap();
        let p = path("tags");
        let created = store
            .create(&p, &RecordId::new("t"), &Attributes::new(), Timestamp::new(1))
            .unwrap();
        let updated = store.update(&created, &Attributes::new(), Timestamp::new(2)).unwrap();
        assert_eq!(store.max_updated(&p).unwrap(), Some(Timestamp::new(2)));

        store.delete(&updated).unwrap();
        assert_eq!(store.count(&p).unwrap(), 0);
        assert!(store.records(&p).unwrap().is_empty());
    }

    #[test]
    fn file_failed_write_leaves_cache_untouched() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path(), true).unwrap();
        let p = path("tags");
        let id = RecordId::new("t");
        store.create(&p, &id, &Attributes::new(), Timestamp::new(1)).unwrap();

        let result = store.create(&p, &id, &Attributes::new(), Timestamp::new(5));
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(store.max_updated(&p).unwrap(), Some(Timestamp::new(1)));
    }

    #[test]
    fn file_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("tags.json"),
            br#"{"version":99,"records":[]}"#,
        )
        .unwrap();
        let store = FileStore::open(dir.path(), true).unwrap();
        let result = store.count(&path("tags"));
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
