//! Tiered storage for learned influence rows and cached rankings.
//!
//! Two tiers serve different access patterns:
//!
//! - [`MemStore`](mem::MemStore): hot data in concurrent hashmaps (DashMap)
//! - [`DurableStore`](durable::DurableStore): ACID transactions (redb)
//!
//! [`TieredStore`] writes through to both and promotes durable reads into the
//! hot tier. Values are bincode-encoded.

pub mod durable;
pub mod mem;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::influence::InfluenceProbability;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Logical table a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    /// Dataset id -> every influence row of the dataset.
    Influence,
    /// `dataset/horizon` -> one cached ranking.
    Rankings,
}

impl Keyspace {
    pub const ALL: [Keyspace; 2] = [Keyspace::Influence, Keyspace::Rankings];
}

/// Key of the ranking cached for a dataset and horizon.
pub fn ranking_key(dataset_id: &str, horizon_minutes: u32) -> String {
    format!("{dataset_id}/{horizon_minutes}")
}

/// Split a ranking key back into dataset and horizon.
pub fn parse_ranking_key(key: &str) -> Option<(&str, u32)> {
    let (dataset, horizon) = key.rsplit_once('/')?;
    Some((dataset, horizon.parse().ok()?))
}

/// Composable tiered store: hot (mem) in front of durable (redb).
pub struct TieredStore {
    pub hot: mem::MemStore,
    pub durable: Option<durable::DurableStore>,
}

impl TieredStore {
    /// Create a memory-only store (no persistence).
    pub fn memory_only() -> Self {
        Self {
            hot: mem::MemStore::new(),
            durable: None,
        }
    }

    /// Create a store that persists under `data_dir`.
    pub fn with_persistence(data_dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            hot: mem::MemStore::new(),
            durable: Some(durable::DurableStore::open(data_dir)?),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    /// Write a value through both tiers. The durable write is one transaction.
    pub fn put(&self, keyspace: Keyspace, key: &str, value: Vec<u8>) -> StoreResult<()> {
        if let Some(durable) = &self.durable {
            durable.put(keyspace, key, &value)?;
        }
        self.hot.put(keyspace, key, value);
        Ok(())
    }

    /// Read a value, checking hot then durable.
    pub fn get(&self, keyspace: Keyspace, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(v) = self.hot.get(keyspace, key) {
            return Ok(Some(v));
        }
        if let Some(durable) = &self.durable {
            if let Some(v) = durable.get(keyspace, key)? {
                // Promote to hot on read
                self.hot.put(keyspace, key, v.clone());
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    /// Remove a key from both tiers. Returns whether it existed anywhere.
    pub fn remove(&self, keyspace: Keyspace, key: &str) -> StoreResult<bool> {
        let durable = match &self.durable {
            Some(d) => d.remove(keyspace, key)?,
            None => false,
        };
        let hot = self.hot.remove(keyspace, key).is_some();
        Ok(durable || hot)
    }

    /// Every key in a keyspace. The durable tier is authoritative when present.
    pub fn keys(&self, keyspace: Keyspace) -> StoreResult<Vec<String>> {
        match &self.durable {
            Some(d) => d.keys(keyspace),
            None => Ok(self.hot.keys(keyspace)),
        }
    }

    /// Encode and store a value.
    pub fn put_value<T: Serialize>(&self, keyspace: Keyspace, key: &str, value: &T) -> StoreResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Serialization {
            message: format!("failed to encode {key}: {e}"),
        })?;
        self.put(keyspace, key, bytes)
    }

    /// Read and decode a value.
    pub fn get_value<T: DeserializeOwned>(&self, keyspace: Keyspace, key: &str) -> StoreResult<Option<T>> {
        let Some(bytes) = self.get(keyspace, key)? else {
            return Ok(None);
        };
        let value = bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization {
            message: format!("failed to decode {key}: {e}"),
        })?;
        Ok(Some(value))
    }

    /// Replace every influence row of a dataset in one write.
    pub fn replace_influence(&self, dataset_id: &str, rows: &[InfluenceProbability]) -> StoreResult<()> {
        self.put_value(Keyspace::Influence, dataset_id, &rows)?;
        tracing::debug!(dataset_id, rows = rows.len(), "stored influence rows");
        Ok(())
    }

    /// Every influence row of a dataset; empty when nothing was learned.
    pub fn influence(&self, dataset_id: &str) -> StoreResult<Vec<InfluenceProbability>> {
        Ok(self
            .get_value(Keyspace::Influence, dataset_id)?
            .unwrap_or_default())
    }

    /// Drop every cached ranking of a dataset. Returns how many were removed.
    pub fn invalidate_rankings(&self, dataset_id: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for key in self.keys(Keyspace::Rankings)? {
            if parse_ranking_key(&key).is_some_and(|(d, _)| d == dataset_id)
                && self.remove(Keyspace::Rankings, &key)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("hot_entries", &self.hot.len())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influence::{ConfidenceTier, ModelType};
    use crate::segment::SegmentId;

    fn row(from: u64, to: u64) -> InfluenceProbability {
        InfluenceProbability {
            from_segment_id: SegmentId::new(from).unwrap(),
            to_segment_id: SegmentId::new(to).unwrap(),
            time_horizon_minutes: 30,
            probability: 0.4,
            model_type: ModelType::Lim,
            confidence: ConfidenceTier::Medium,
            sample_count: 6,
        }
    }

    #[test]
    fn ranking_keys_round_trip() {
        assert_eq!(ranking_key("city/north", 15), "city/north/15");
        assert_eq!(parse_ranking_key("city/north/15"), Some(("city/north", 15)));
        assert_eq!(parse_ranking_key("nohorizon"), None);
    }

    #[test]
    fn influence_rows_replace_wholesale() {
        let store = TieredStore::memory_only();
        assert!(store.influence("d").unwrap().is_empty());
        store.replace_influence("d", &[row(1, 2), row(2, 3)]).unwrap();
        store.replace_influence("d", &[row(3, 4)]).unwrap();
        assert_eq!(store.influence("d").unwrap(), vec![row(3, 4)]);
    }

    #[test]
    fn durable_reads_promote_to_hot() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = TieredStore::with_persistence(dir.path()).unwrap();
            store.replace_influence("d", &[row(1, 2)]).unwrap();
        }
        let store = TieredStore::with_persistence(dir.path()).unwrap();
        assert!(store.hot.is_empty());
        assert_eq!(store.influence("d").unwrap(), vec![row(1, 2)]);
        assert_eq!(store.hot.len(), 1);
    }

    #[test]
    fn invalidate_only_touches_one_dataset() {
        let store = TieredStore::memory_only();
        store.put(Keyspace::Rankings, &ranking_key("a", 5), vec![1]).unwrap();
        store.put(Keyspace::Rankings, &ranking_key("a", 30), vec![1]).unwrap();
        store.put(Keyspace::Rankings, &ranking_key("ab", 5), vec![1]).unwrap();
        assert_eq!(store.invalidate_rankings("a").unwrap(), 2);
        assert_eq!(store.keys(Keyspace::Rankings).unwrap(), vec!["ab/5"]);
    }

    #[test]
    fn corrupt_value_is_a_serialization_error() {
        let store = TieredStore::memory_only();
        store.put(Keyspace::Influence, "d", vec![0xff]).unwrap();
        assert!(matches!(
            store.influence("d"),
            Err(StoreError::Serialization { .. })
        ));
    }
}
