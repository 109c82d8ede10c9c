// Copyright 2026 Pandora Web Server contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded, per-dispatch-type cache of pre-built chains with approximate-LRU eviction under
//! concurrent readers.
//!
//! Five independent caches are maintained, one per [`DispatchType`]. Each pairs a concurrent map
//! (`scc::HashMap`, keyed by path or handler name) with a concurrent FIFO queue of keys in
//! insertion order — not access order, hence "approximate" LRU. The map and queue are updated
//! independently, without a lock spanning both; see [`DispatchTypeCache::insert`] for how eviction
//! stays safe under that race.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::chain::Chain;
use crate::context::DispatchType;

struct DispatchTypeCache<Req, Res> {
    map: scc::HashMap<String, Arc<Chain<Req, Res>>>,
    queue: SegQueue<String>,
}

impl<Req, Res> DispatchTypeCache<Req, Res> {
    fn new() -> Self {
        Self {
            map: scc::HashMap::new(),
            queue: SegQueue::new(),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Arc<Chain<Req, Res>>> {
        self.map.read_async(key, |_, chain| Arc::clone(chain)).await
    }

    /// Inserts `(key, chain)`, enqueues the key, then evicts while the map is still at or over
    /// `max_entries`.
    ///
    /// If the queue runs dry while the map is still full — because a concurrent writer drained it
    /// first — the whole map is cleared and the loop stops. That is the explicit fallback this
    /// cache relies on instead of a lock covering both structures.
    async fn insert(&self, key: String, chain: Arc<Chain<Req, Res>>, max_entries: usize) {
        let _ = self.map.insert_async(key.clone(), chain).await;
        self.queue.push(key);

        while self.map.len() >= max_entries {
            match self.queue.pop() {
                Some(evict_key) => {
                    let _ = self.map.remove_async(&evict_key).await;
                }
                None => {
                    self.map.clear_async().await;
                    break;
                }
            }
        }
    }

    /// Synchronous: called from `rebuild`, which the spec documents as a synchronous operation.
    fn invalidate(&self) {
        self.map.clear();
        while self.queue.pop().is_some() {}
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Bounded cache of pre-built [`Chain`]s, keyed by (path-or-name, dispatch type).
///
/// Caching is optional: when disabled, [`crate::dispatcher::Dispatcher`] simply never looks up or
/// inserts into this structure, and each request gets a freshly built, uncached chain instead.
pub(crate) struct ChainCache<Req, Res> {
    caches: [DispatchTypeCache<Req, Res>; DispatchType::COUNT],
    max_entries: AtomicUsize,
    enabled: AtomicBool,
}

impl<Req, Res> std::fmt::Debug for ChainCache<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCache")
            .field("max_entries", &self.max_entries.load(Ordering::Relaxed))
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("len_per_dispatch_type", &self.caches.iter().map(DispatchTypeCache::len).collect::<Vec<_>>())
            .finish()
    }
}

impl<Req, Res> ChainCache<Req, Res> {
    pub(crate) fn new(max_entries: usize, enabled: bool) -> Self {
        Self {
            caches: std::array::from_fn(|_| DispatchTypeCache::new()),
            max_entries: AtomicUsize::new(max_entries),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Stored as an atomic rather than behind a lock: read on every request's hot path, so a
    /// caller changing it concurrently with in-flight requests simply takes effect for whichever
    /// requests observe the new value, same as `enabled` below.
    pub(crate) fn set_max_entries(&self, max_entries: usize) {
        self.max_entries.store(max_entries, Ordering::Relaxed);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Wait-free lookup on the read path: a single map read, returning a hit if one exists.
    pub(crate) async fn lookup(&self, dispatch_type: DispatchType, key: &str) -> Option<Arc<Chain<Req, Res>>> {
        if !self.is_enabled() {
            return None;
        }
        self.caches[dispatch_type.index()].lookup(key).await
    }

    /// Records a freshly built chain for `key` under `dispatch_type`, evicting as needed to stay
    /// within `max_entries`. No-op when caching is disabled.
    pub(crate) async fn insert(&self, dispatch_type: DispatchType, key: String, chain: Arc<Chain<Req, Res>>) {
        if !self.is_enabled() {
            return;
        }
        let max_entries = self.max_entries.load(Ordering::Relaxed);
        self.caches[dispatch_type.index()].insert(key, chain, max_entries).await;
    }

    /// Clears all five maps and queues. Called synchronously from `rebuild` on any configuration
    /// mutation once the dispatcher has started.
    pub(crate) fn invalidate(&self) {
        for cache in &self.caches {
            cache.invalidate();
        }
    }

    /// Number of entries currently cached for `dispatch_type`, for tests and diagnostics.
    pub(crate) fn len(&self, dispatch_type: DispatchType) -> usize {
        self.caches[dispatch_type.index()].len()
    }
}
