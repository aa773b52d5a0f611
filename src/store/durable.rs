//! ACID-durable key-value store backed by redb.
//!
//! Holds learned influence rows and cached rankings so both survive restarts.
//! Every write is a single transaction, so a reader sees either the old
//! value or the new one, never a mix.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::{Keyspace, StoreResult};

/// Influence rows per dataset.
const INFLUENCE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("influence");

/// Cached rankings per (dataset, horizon).
const RANKING_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rankings");

fn table_for(keyspace: Keyspace) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match keyspace {
        Keyspace::Influence => INFLUENCE_TABLE,
        Keyspace::Rankings => RANKING_TABLE,
    }
}

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// ACID-durable store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("jamspread.redb");
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create both tables up front so read transactions never miss them.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        for keyspace in Keyspace::ALL {
            txn.open_table(table_for(keyspace))
                .map_err(redb_err("open_table"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Store a value, replacing any previous one in the same transaction.
    pub fn put(&self, keyspace: Keyspace, key: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(redb_err("begin_write"))?;
        {
            let mut table = txn
                .open_table(table_for(keyspace))
                .map_err(redb_err("open_table"))?;
            table
                .insert(key, value)
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    /// Read a value by key. Returns `Ok(None)` if the key doesn't exist.
    pub fn get(&self, keyspace: Keyspace, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self
            .db
            .begin_read()
            .map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(table_for(keyspace))
            .map_err(redb_err("open_table"))?;
        let result = table.get(key).map_err(redb_err("get"))?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    /// Delete a key. Returns whether the key existed.
    pub fn remove(&self, keyspace: Keyspace, key: &str) -> StoreResult<bool> {
        let txn = self
            .db
            .begin_write()
            .map_err(redb_err("begin_write"))?;
        let existed = {
            let mut table = txn
                .open_table(table_for(keyspace))
                .map_err(redb_err("open_table"))?;
            let result = table
                .remove(key)
                .map_err(redb_err("remove"))?;
            result.is_some()
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(existed)
    }

    /// Every key in a keyspace, in key order.
    pub fn keys(&self, keyspace: Keyspace) -> StoreResult<Vec<String>> {
        let txn = self
            .db
            .begin_read()
            .map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(table_for(keyspace))
            .map_err(redb_err("open_table"))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(redb_err("iter"))? {
            let (key, _) = entry.map_err(redb_err("iter"))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}
