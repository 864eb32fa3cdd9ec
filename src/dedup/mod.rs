// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! Concurrency-safe "insert if absent, else return prior owner" stores.
//!
//! This is the core anti-replay primitive: the provider's token ledgers and
//! the appserver's seen-hash set are all [`DedupStore`] namespaces. Per-key
//! insertion is linearizable (every key observes a single, globally agreed
//! first writer) and nothing is ordered across different keys.
//!
//! Two backends, selected at deployment time:
//!
//! - [`MemoryDedupStore`]: sharded in-process lock table (default)
//! - [`RedbDedupStore`]: durable, one redb table per namespace

pub mod memory;
pub mod redb;

pub use memory::MemoryDedupStore;
pub use redb::RedbDedupStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Backend(String),
}

/// Atomic set-with-owner.
///
/// `insert_if_absent` associates `value` with `key` iff the key is new and
/// returns `None`; when the key already exists the stored value is returned
/// and the new one discarded (first-writer wins, never overwritten).
pub trait DedupStore: Send + Sync {
    fn insert_if_absent(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Batch form with the same per-key guarantee. A key occurring twice in
    /// one batch reports the second occurrence as a duplicate of the first.
    fn insert_batch(
        &self,
        keys: &[&[u8]],
        value: &[u8],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        keys.iter()
            .map(|key| self.insert_if_absent(key, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn backends() -> Vec<(&'static str, Arc<dyn DedupStore>)> {
        let dir = tempfile::tempdir().unwrap();
        let redb_store =
            RedbDedupStore::open(&dir.path().join("dedup.redb"), "tokens").unwrap();
        // Leak the tempdir so the database outlives this helper.
        std::mem::forget(dir);
        vec![
            ("memory", Arc::new(MemoryDedupStore::new()) as Arc<dyn DedupStore>),
            ("redb", Arc::new(redb_store) as Arc<dyn DedupStore>),
        ]
    }

    #[test]
    fn first_writer_wins() {
        for (name, store) in backends() {
            assert_eq!(store.insert_if_absent(b"token-a", b"mule-1").unwrap(), None);
            assert_eq!(
                store.insert_if_absent(b"token-a", b"mule-2").unwrap(),
                Some(b"mule-1".to_vec()),
                "backend {name}"
            );
            // The prior value is never overwritten.
            assert_eq!(
                store.insert_if_absent(b"token-a", b"mule-3").unwrap(),
                Some(b"mule-1".to_vec()),
                "backend {name}"
            );
        }
    }

    #[test]
    fn distinct_keys_are_independent() {
        for (_, store) in backends() {
            assert_eq!(store.insert_if_absent(b"k1", b"v").unwrap(), None);
            assert_eq!(store.insert_if_absent(b"k2", b"v").unwrap(), None);
        }
    }

    #[test]
    fn batch_dedups_within_itself() {
        for (name, store) in backends() {
            let keys: Vec<&[u8]> = vec![b"x", b"y", b"x"];
            let results = store.insert_batch(&keys, b"mule-1").unwrap();
            assert_eq!(
                results,
                vec![None, None, Some(b"mule-1".to_vec())],
                "backend {name}"
            );
        }
    }

    #[test]
    fn concurrent_inserters_agree_on_one_winner() {
        for (name, store) in backends() {
            let threads = 32;
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || {
                        store
                            .insert_if_absent(b"contended-token", &[i as u8])
                            .unwrap()
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let fresh = results.iter().filter(|r| r.is_none()).count();
            assert_eq!(fresh, 1, "backend {name}: exactly one inserter wins");

            let winner = store
                .insert_if_absent(b"contended-token", b"probe")
                .unwrap()
                .expect("key must exist");
            for prior in results.into_iter().flatten() {
                assert_eq!(prior, winner, "backend {name}: single agreed first writer");
            }
        }
    }
}
