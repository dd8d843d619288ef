// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A concurrent, fixed-capacity table of in-flight block requests.
//!
//! [`InflightTable`] correlates a request's issue with its completion: `begin`
//! stores a value under the request handle, `end` removes and returns it.
//! The table is sharded by a hash of the handle so that unrelated requests
//! never contend on a lock, and each shard is pre-allocated to its capacity
//! so the table never grows beyond its configured bound.
//!
//! Overflow policy: when a shard is full, `begin` rejects the new entry and
//! reports the rejection to the caller. Entries that never complete remain
//! until [`InflightTable::clear`]; there is no timeout eviction.

#![forbid(unsafe_code)]

use blk_defs::ReqHandle;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Default total entry capacity, sized generously relative to the queue depth
/// of a busy device stack.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Default shard count. Must be a power of two.
pub const DEFAULT_SHARDS: usize = 64;

/// A sharded map of in-flight requests, keyed by [`ReqHandle`].
pub struct InflightTable<V> {
    shards: Box<[Mutex<HashMap<ReqHandle, V>>]>,
    shard_capacity: usize,
}

impl<V> InflightTable<V> {
    /// Creates a table holding at most `capacity` entries across `shards`
    /// shards.
    ///
    /// The per-shard capacity is `capacity / shards`, rounded up, so a skewed
    /// handle distribution can reject slightly below the total capacity.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is not a nonzero power of two or if `capacity`
    /// is zero.
    pub fn new(capacity: usize, shards: usize) -> Self {
        assert!(shards.is_power_of_two());
        assert_ne!(capacity, 0);
        let shard_capacity = capacity.div_ceil(shards);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(HashMap::with_capacity(shard_capacity)))
                .collect(),
            shard_capacity,
        }
    }

    fn shard(&self, handle: ReqHandle) -> &Mutex<HashMap<ReqHandle, V>> {
        // Fibonacci hashing; the handle is typically a pointer-derived value
        // whose low bits carry little entropy.
        let hash = handle.0.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let index = (hash >> 32) as usize & (self.shards.len() - 1);
        &self.shards[index]
    }

    /// Records an issued request.
    ///
    /// A second `begin` for a handle already in the table is a re-issue: the
    /// old value is overwritten, not treated as an error. Returns `false` if
    /// the owning shard was full and the entry was rejected.
    pub fn begin(&self, handle: ReqHandle, value: V) -> bool {
        let mut shard = self.shard(handle).lock();
        if shard.len() >= self.shard_capacity && !shard.contains_key(&handle) {
            return false;
        }
        shard.insert(handle, value);
        true
    }

    /// Consumes the entry for a completed request, if one is being tracked.
    ///
    /// `None` means the completion is untracked: either the issue was never
    /// seen (or was rejected), or a duplicate completion already consumed it.
    pub fn end(&self, handle: ReqHandle) -> Option<V> {
        self.shard(handle).lock().remove(&handle)
    }

    /// The number of currently tracked requests.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// The total entry capacity.
    pub fn capacity(&self) -> usize {
        self.shard_capacity * self.shards.len()
    }

    /// Drops every tracked entry, retaining the allocated capacity.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}
