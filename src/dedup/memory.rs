// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Mulepay Contributors

//! In-process sharded dedup store.
//!
//! Keys are uniformly distributed (tokens and hashes), so sharding on the
//! first key byte keeps lock contention low under parallel redemption
//! batches without any hashing of our own.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{DedupStore, StoreError};

const SHARDS: usize = 64;

pub struct MemoryDedupStore {
    shards: Vec<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &[u8]) -> &Mutex<HashMap<Vec<u8>, Vec<u8>>> {
        let index = key.first().copied().unwrap_or(0) as usize % SHARDS;
        &self.shards[index]
    }
}

impl Default for MemoryDedupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupStore for MemoryDedupStore {
    fn insert_if_absent(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut shard = self.shard(key).lock().expect("dedup shard poisoned");
        if let Some(prior) = shard.get(key) {
            return Ok(Some(prior.clone()));
        }
        shard.insert(key.to_vec(), value.to_vec());
        Ok(None)
    }
}
