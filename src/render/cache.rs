// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Two-tier render cache: per-block and whole-result, both bounded LRU
//! keyed by a SHA-256 digest over the documented key fields.
//!
//! Mirrors the content-addressed LRU pattern `sven-image` uses for its
//! in-process image cache: a `lru::LruCache` behind a `Mutex`, keyed on a
//! digest of the cacheable content rather than a hand-rolled hash table.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use sha2::Digest as _;

pub type CacheKey = [u8; 32];

/// A bounded, digest-keyed LRU cache. Both the block cache and the result
/// cache are instances of this with different value types.
pub struct DigestCache<V> {
    inner: Mutex<lru::LruCache<CacheKey, V>>,
}

impl<V: Clone> DigestCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(lru::LruCache::new(capacity)) }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut cache = self.inner.lock().expect("render cache mutex poisoned");
        cache.get(key).cloned()
    }

    /// Insert `value` for `key`, evicting the oldest entry if at capacity.
    pub fn put(&self, key: CacheKey, value: V) {
        let mut cache = self.inner.lock().expect("render cache mutex poisoned");
        cache.put(key, value);
    }

    pub fn get_or_insert_with(&self, key: CacheKey, f: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let value = f();
        self.put(key, value.clone());
        value
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Hash an arbitrary sequence of key fragments into a digest. Each
/// fragment is length-prefixed so `hash_fields(&["ab", "c"])` and
/// `hash_fields(&["a", "bc"])` never collide.
pub fn hash_fields(fields: &[&str]) -> CacheKey {
    let mut hasher = sha2::Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().into()
}
