//! Key-Value Adapter (spec §4.1): a thin façade over the external
//! store. Exposes the four operations keyed by 16-byte identifiers and
//! maps every engine error onto the single "storage failure" condition
//! the rest of the core treats as fatal.

use crate::error::{FsError, FsResult};
use crate::key::Key;
use crate::store::Store;

pub struct Adapter {
    store: Store,
}

impl Adapter {
    pub fn new(store: Store) -> Adapter {
        Adapter { store }
    }

    pub fn put(&mut self, key: Key, bytes: Vec<u8>) -> FsResult<()> {
        self.store
            .store(key, bytes)
            .map_err(|e| FsError::Storage(e.to_string()))
    }

    pub fn get(&self, key: &Key) -> FsResult<Option<Vec<u8>>> {
        self.store
            .fetch(key)
            .map_err(|e| FsError::Storage(e.to_string()))
    }

    pub fn append(&mut self, key: Key, bytes: &[u8]) -> FsResult<()> {
        self.store
            .append(key, bytes)
            .map_err(|e| FsError::Storage(e.to_string()))
    }

    pub fn delete(&mut self, key: &Key) -> FsResult<()> {
        self.store
            .delete(key)
            .map_err(|e| FsError::Storage(e.to_string()))
    }

    pub fn flush(&mut self) -> FsResult<()> {
        self.store
            .sync()
            .map_err(|e| FsError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get() {
        let dir = tempdir().unwrap();
        let mut adapter = Adapter::new(Store::open(dir.path().join("s.kv")).unwrap());
        let key = Key::fresh();
        adapter.put(key, b"payload".to_vec()).unwrap();
        assert_eq!(adapter.get(&key).unwrap().unwrap(), b"payload".to_vec());
    }

    #[test]
    fn delete_then_get_is_none() {
        let dir = tempdir().unwrap();
        let mut adapter = Adapter::new(Store::open(dir.path().join("s.kv")).unwrap());
        let key = Key::fresh();
        adapter.put(key, b"x".to_vec()).unwrap();
        adapter.delete(&key).unwrap();
        assert!(adapter.get(&key).unwrap().is_none());
    }
}
