// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tunable parameters for the orchestration core.
//!
//! Loading these from a file or CLI flags is an external collaborator's
//! job (file/configuration loading is out of scope here); the core only
//! consumes an already-constructed [`CoreConfig`].

use std::time::Duration;

/// Tunables for the stream controllers, recents machine, and render pipeline.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Ring buffer size for the most recent raw provider events kept per
    /// stream controller, for diagnostics after a failure.
    pub stream_ring_capacity: usize,
    /// Per-block render cache capacity (LRU).
    pub block_cache_capacity: usize,
    /// Whole-result render cache capacity (LRU).
    pub result_cache_capacity: usize,
    /// Bound on the clipboard runner's pending-copy queue.
    pub clipboard_queue_bound: usize,
    /// Bound on the selection history's back/forward stacks.
    pub selection_history_capacity: usize,
    /// Default timeout for short-lived command tasks (kill, dismiss, approve, ...).
    pub command_timeout: Duration,
    /// Timeout for `sendMessage`-class command tasks, which run longer.
    pub send_timeout: Duration,
    /// Debounce window for app-state save-flush coalescing.
    pub save_debounce: Duration,
    /// Coarseness of the "now" bucket used as a render-cache key component
    /// when relative timestamps are active.
    pub relative_bucket: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            stream_ring_capacity: 256,
            block_cache_capacity: 4096,
            result_cache_capacity: 128,
            clipboard_queue_bound: 8,
            selection_history_capacity: 128,
            command_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(120),
            save_debounce: Duration::from_millis(500),
            relative_bucket: Duration::from_secs(1),
        }
    }
}
