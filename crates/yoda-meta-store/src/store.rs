//! Persistent catalog store backed by redb.
//!
//! Provides typed put/get/update/load methods for each table. All writes
//! are synchronous (write txn + commit). `update_*` reads and writes inside
//! one write transaction, which gives the per-entry atomicity that flag
//! removal relies on.

use crate::tables;
use crate::types::{StoredDataObject, StoredResource};
use redb::{Database, ReadableTable};
use std::path::Path;
use tracing::error;

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;

/// Persistent catalog store backed by redb.
pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> MetaStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::DATA_OBJECTS)?;
            let _t = write_txn.open_table(tables::RESOURCES)?;
            let _t = write_txn.open_table(tables::COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // ---- Data objects (bincode) ----

    pub fn put_data_object(&self, object: &StoredDataObject) -> MetaStoreResult<()> {
        self.put_bincode(tables::DATA_OBJECTS, &object.path, object)
    }

    pub fn get_data_object(&self, path: &str) -> MetaStoreResult<Option<StoredDataObject>> {
        self.get_bincode(tables::DATA_OBJECTS, path)
    }

    pub fn delete_data_object(&self, path: &str) -> MetaStoreResult<bool> {
        self.delete_key(tables::DATA_OBJECTS, path)
    }

    pub fn load_data_objects(&self) -> MetaStoreResult<Vec<StoredDataObject>> {
        Ok(self
            .load_bincode_table(tables::DATA_OBJECTS)?
            .into_iter()
            .map(|(_, object)| object)
            .collect())
    }

    /// Data objects at or below a collection, in path order
    pub fn load_data_objects_within(
        &self,
        collection: &str,
    ) -> MetaStoreResult<Vec<StoredDataObject>> {
        let prefix = format!("{}/", collection.trim_end_matches('/'));
        Ok(self
            .load_bincode_table::<StoredDataObject>(tables::DATA_OBJECTS)?
            .into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, object)| object)
            .collect())
    }

    /// Apply `f` to a data object inside one write transaction.
    ///
    /// Returns `None` when the object does not exist.
    pub fn update_data_object<R>(
        &self,
        path: &str,
        f: impl FnOnce(&mut StoredDataObject) -> R,
    ) -> MetaStoreResult<Option<R>> {
        self.update_bincode(tables::DATA_OBJECTS, path, f)
    }

    /// Issue the next data id
    pub fn next_data_id(&self) -> MetaStoreResult<u64> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut table = write_txn.open_table(tables::COUNTERS)?;
            let current = table.get("data_id")?.map_or(10_000, |v| v.value());
            let next = current + 1;
            table.insert("data_id", next)?;
            next
        };
        write_txn.commit()?;
        Ok(id)
    }

    // ---- Resources (bincode) ----

    pub fn put_resource(&self, resource: &StoredResource) -> MetaStoreResult<()> {
        self.put_bincode(tables::RESOURCES, &resource.name, resource)
    }

    pub fn get_resource(&self, name: &str) -> MetaStoreResult<Option<StoredResource>> {
        self.get_bincode(tables::RESOURCES, name)
    }

    pub fn load_resources(&self) -> MetaStoreResult<Vec<StoredResource>> {
        Ok(self
            .load_bincode_table(tables::RESOURCES)?
            .into_iter()
            .map(|(_, resource)| resource)
            .collect())
    }

    pub fn update_resource<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut StoredResource) -> R,
    ) -> MetaStoreResult<Option<R>> {
        self.update_bincode(tables::RESOURCES, name, f)
    }

    // ---- Generic helpers ----

    fn put_bincode<T: serde::Serialize>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> MetaStoreResult<()> {
        let bytes = bincode::serialize(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_bincode<T: serde::de::DeserializeOwned>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> MetaStoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        match table.get(key)? {
            Some(val) => Ok(Some(bincode::deserialize(val.value())?)),
            None => Ok(None),
        }
    }

    fn update_bincode<T, R>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> MetaStoreResult<Option<R>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(table_def)?;
            let current: Option<T> = match table.get(key)? {
                Some(val) => Some(bincode::deserialize(val.value())?),
                None => None,
            };
            match current {
                Some(mut value) => {
                    let result = f(&mut value);
                    let bytes = bincode::serialize(&value)?;
                    table.insert(key, bytes.as_slice())?;
                    Some(result)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    fn delete_key(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> MetaStoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(table_def)?;
            let removed = table.remove(key)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn load_bincode_table<T: serde::de::DeserializeOwned>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
    ) -> MetaStoreResult<Vec<(String, T)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let key = entry.0.value().to_string();
            let bytes = entry.1.value();
            match bincode::deserialize::<T>(bytes) {
                Ok(val) => result.push((key, val)),
                Err(e) => error!("Failed to decode entry '{}': {}", key, e),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use yoda_common::Avu;

    fn object(path: &str) -> StoredDataObject {
        StoredDataObject {
            data_id: 1,
            path: path.into(),
            owner: "alice".into(),
            group: "research-a".into(),
            size: 3,
            modify_time: 0,
            replicas: vec!["src".into()],
            avus: Vec::new(),
            acls: BTreeMap::new(),
        }
    }

    #[test]
    fn test_data_object_roundtrip_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("catalog.redb")).unwrap();

        store.put_data_object(&object("/z/home/a")).unwrap();
        let added = store
            .update_data_object("/z/home/a", |o| {
                o.add_avu(Avu::new("replication_scheduled", "src,dst"))
            })
            .unwrap();
        assert_eq!(added, Some(true));
        assert_eq!(
            store.update_data_object("/z/home/missing", |_| ()).unwrap(),
            None
        );

        let loaded = store.get_data_object("/z/home/a").unwrap().unwrap();
        assert_eq!(loaded.values_of("replication_scheduled"), vec!["src,dst"]);

        assert!(store.delete_data_object("/z/home/a").unwrap());
        assert!(!store.delete_data_object("/z/home/a").unwrap());
    }

    #[test]
    fn test_load_within_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("catalog.redb")).unwrap();
        store.put_data_object(&object("/z/yoda/revisions/a")).unwrap();
        store.put_data_object(&object("/z/yoda/revisions/b/c")).unwrap();
        store.put_data_object(&object("/z/yoda/revisionsX/d")).unwrap();
        store.put_data_object(&object("/z/home/e")).unwrap();

        let within = store.load_data_objects_within("/z/yoda/revisions").unwrap();
        let paths: Vec<_> = within.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/z/yoda/revisions/a", "/z/yoda/revisions/b/c"]);
    }

    #[test]
    fn test_next_data_id_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("catalog.redb")).unwrap();
        let a = store.next_data_id().unwrap();
        let b = store.next_data_id().unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_resources_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.redb");
        {
            let store = MetaStore::open(&path).unwrap();
            let mut resc = StoredResource {
                name: "R1".into(),
                free_bytes: Some(100),
                total_bytes: Some(1000),
                ..StoredResource::default()
            };
            resc.set_avu("yoda::arb", "READY_FOR_DATA");
            store.put_resource(&resc).unwrap();
        }
        let store = MetaStore::open(&path).unwrap();
        let resc = store.get_resource("R1").unwrap().unwrap();
        assert_eq!(resc.free_bytes, Some(100));
        assert_eq!(store.load_resources().unwrap().len(), 1);
    }
}
