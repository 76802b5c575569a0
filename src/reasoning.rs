// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-user-turn aggregation of reasoning segments into one visible block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::transcript::Transcript;

/// Accumulates `(segment-id, text)` pairs within one user turn and
/// maintains the single aggregated reasoning block via
/// [`Transcript::upsert_reasoning`].
///
/// The group id counter is per-`ReasoningAccumulator` (i.e. per
/// transcript), not process-global, so two open sessions in the same
/// process number their groups independently.
pub struct ReasoningAccumulator {
    group_seq: AtomicU64,
    group_id: String,
    /// segment-id -> text, insertion-order preserved via `order`.
    segments: HashMap<String, String>,
    order: Vec<String>,
    anon_seq: u64,
}

impl ReasoningAccumulator {
    pub fn new() -> Self {
        let group_seq = AtomicU64::new(0);
        let group_id = Self::next_group_id(&group_seq);
        Self {
            group_seq,
            group_id,
            segments: HashMap::new(),
            order: Vec::new(),
            anon_seq: 0,
        }
    }

    fn next_group_id(seq: &AtomicU64) -> String {
        let n = seq.fetch_add(1, Ordering::Relaxed);
        format!("codex-group-{n}")
    }

    /// Current group id, used to derive the aggregated block's id via
    /// [`crate::block::ChatBlock::reasoning_id`].
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Start a new reasoning group at a user-turn boundary.
    pub fn reset(&mut self) {
        self.group_id = Self::next_group_id(&self.group_seq);
        self.segments.clear();
        self.order.clear();
        self.anon_seq = 0;
    }

    /// Feed a reasoning segment. `segment_id` of `None` receives a
    /// synthetic `__anon_N` id so duplicate delivery of an unlabeled
    /// segment keeps a stable position instead of appending again.
    ///
    /// Applies the upsert to `transcript` and returns whether it changed.
    pub fn feed(&mut self, segment_id: Option<&str>, text: &str, transcript: &mut Transcript) -> bool {
        let id = match segment_id {
            Some(id) => id.to_string(),
            None => {
                let id = format!("__anon_{}", self.anon_seq);
                self.anon_seq += 1;
                id
            }
        };
        if !self.segments.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.segments.insert(id, text.to_string());
        let combined = self.combined_text();
        transcript.upsert_reasoning(&self.group_id, &combined)
    }

    fn combined_text(&self) -> String {
        self.order
            .iter()
            .filter_map(|id| self.segments.get(id))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ReasoningAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
