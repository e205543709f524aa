//! The key-value backend the authenticated tries persist through.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use mizar_types::error::StorageError;
use redb::{Database, ReadableTable, TableDefinition};

/// A thread-safe byte-oriented key-value store. Trie nodes are written
/// content-addressed through this interface, so implementations only
/// need get/put; deletion is handled by pruning, which is out of scope
/// here.
pub trait KvBackend: Send + Sync {
    /// Reads a value. Absent keys are `Ok(None)`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes a single value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Writes a batch atomically: either every entry lands or none do.
    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError>;

    /// Whether a key is present.
    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }
}

/// An in-memory backend for tests and speculative state.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store behind an `Arc`, the form the tries take.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self
            .map
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut map = self
            .map
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let mut map = self
            .map
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

const KV: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// A redb-backed [`KvBackend`]; one database file per store.
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Opens (or creates) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let w = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(KV)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvBackend for RedbKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r
            .open_table(KV)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = t
            .get(key)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|v| v.value().to_vec());
        Ok(result)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.put_batch(&[(key.to_vec(), value.to_vec())])
    }

    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w
                .open_table(KV)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for (key, value) in entries {
                t.insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &dyn KvBackend) {
        assert!(backend.get(b"missing").unwrap().is_none());
        backend.put(b"a", b"1").unwrap();
        assert_eq!(backend.get(b"a").unwrap().unwrap(), b"1");

        backend
            .put_batch(&[(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())])
            .unwrap();
        assert!(backend.contains(b"b").unwrap());
        assert_eq!(backend.get(b"c").unwrap().unwrap(), b"3");
    }

    #[test]
    fn memory_backend() {
        exercise(&MemoryKv::new());
    }

    #[test]
    fn redb_backend() {
        let dir = tempfile::tempdir().unwrap();
        let kv = RedbKv::open(dir.path().join("kv.redb")).unwrap();
        exercise(&kv);
    }

    #[test]
    fn redb_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.redb");
        {
            let kv = RedbKv::open(&path).unwrap();
            kv.put(b"k", b"v").unwrap();
        }
        let kv = RedbKv::open(&path).unwrap();
        assert_eq!(kv.get(b"k").unwrap().unwrap(), b"v");
    }
}
