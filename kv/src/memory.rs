//! In-memory key-value store implementation for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{KVError, KVResult, KVStore};

/// An in-memory key-value store backed by a BTreeMap.
///
/// The single interior mutex makes every operation, including
/// [`KVStore::put_if_absent`], atomic with respect to concurrent callers.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> KVResult<bool> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        data.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set("key1", b"value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));

        assert_eq!(store.get("nonexistent").unwrap(), None);

        store.delete("key1").unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_put_if_absent() {
        let store = MemoryStore::new();

        assert!(store.put_if_absent("k", b"first").unwrap());
        assert!(!store.put_if_absent("k", b"second").unwrap());

        // Losing writer must not clobber the stored value.
        assert_eq!(store.get("k").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_put_if_absent_concurrent() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let s = store.clone();
            handles.push(thread::spawn(move || {
                s.put_if_absent("race", format!("w{i}").as_bytes()).unwrap()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1, "exactly one writer must win the insert");
    }

    #[test]
    fn test_scan() {
        let store = MemoryStore::new();
        store.set("prefix:a", b"1").unwrap();
        store.set("prefix:b", b"2").unwrap();
        store.set("other:c", b"3").unwrap();

        let results = store.scan("prefix:").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "prefix:a");
        assert_eq!(results[1].0, "prefix:b");
    }
}
