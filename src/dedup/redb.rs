// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Durable dedup store backed by redb.
//!
//! One table per namespace; each `insert_if_absent` runs inside a single
//! write transaction, so the check and the insert are atomic with respect
//! to every other writer and survive a restart.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::{DedupStore, StoreError};

pub struct RedbDedupStore {
    db: Database,
    table: TableDefinition<'static, &'static [u8], &'static [u8]>,
}

impl RedbDedupStore {
    /// Open (or create) the database at `path` with one namespace table.
    pub fn open(path: &Path, table_name: &'static str) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = TableDefinition::new(table_name);

        // Create the table eagerly so first reads see a consistent schema.
        let txn = db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        txn.open_table(table)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { db, table })
    }
}

impl DedupStore for RedbDedupStore {
    fn insert_if_absent(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let prior = {
            let mut table = txn
                .open_table(self.table)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let existing = table
                .get(key)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|guard| guard.value().to_vec());
            match existing {
                Some(prior) => Some(prior),
                None => {
                    table
                        .insert(key, value)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    None
                }
            }
        };
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.redb");

        {
            let store = RedbDedupStore::open(&path, "tokens").unwrap();
            assert!(store.insert_if_absent(b"token", b"mule-1").unwrap().is_none());
        }

        let store = RedbDedupStore::open(&path, "tokens").unwrap();
        assert_eq!(
            store.insert_if_absent(b"token", b"mule-2").unwrap(),
            Some(b"mule-1".to_vec())
        );
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = RedbDedupStore::open(&dir.path().join("a.redb"), "tokens").unwrap();
        let b = RedbDedupStore::open(&dir.path().join("b.redb"), "complaints").unwrap();

        assert!(a.insert_if_absent(b"t", b"x").unwrap().is_none());
        assert!(b.insert_if_absent(b"t", b"y").unwrap().is_none());
    }
}
