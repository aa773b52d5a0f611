//! In-memory hot storage backed by DashMap.
//!
//! Fronts the durable tier for repeated reads of influence rows and cached
//! rankings. In memory-only mode it is the only tier and everything is lost
//! on process exit.

use dashmap::DashMap;

use super::Keyspace;

/// Concurrent in-memory store using a sharded hashmap.
#[derive(Debug, Default)]
pub struct MemStore {
    data: DashMap<(Keyspace, String), Vec<u8>>,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn put(&self, keyspace: Keyspace, key: &str, value: Vec<u8>) {
        self.data.insert((keyspace, key.to_string()), value);
    }

    /// Get a clone of the stored value.
    pub fn get(&self, keyspace: Keyspace, key: &str) -> Option<Vec<u8>> {
        self.data
            .get(&(keyspace, key.to_string()))
            .map(|v| v.value().clone())
    }

    /// Remove a key and return its value.
    pub fn remove(&self, keyspace: Keyspace, key: &str) -> Option<Vec<u8>> {
        self.data
            .remove(&(keyspace, key.to_string()))
            .map(|(_, v)| v)
    }

    /// Keys of one keyspace, sorted (snapshot, not consistent under concurrent writes).
    pub fn keys(&self, keyspace: Keyspace) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.key().0 == keyspace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
