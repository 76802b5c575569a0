// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Append-only per-session block log with coalescing and reasoning upsert.
//!
//! A `Transcript` is owned exclusively by the controller that produces it
//! (§3, §5): no external mutation, no locking — callers observe it through
//! [`Transcript::blocks`] snapshots.

use crate::block::{BlockStatus, ChatBlock, Role};

/// Ordered sequence of [`ChatBlock`] plus a monotonic version counter.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    blocks: Vec<ChatBlock>,
    /// Bumped on any mutation that changes observable state. Deliberately
    /// *not* bumped by a no-op reasoning upsert (§9 Open Question iii) —
    /// the render pipeline relies on that to skip re-rendering unchanged
    /// transcripts.
    content_version: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[ChatBlock] {
        &self.blocks
    }

    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&ChatBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    fn bump(&mut self) {
        self.content_version += 1;
    }

    /// Append a block, coalescing it into the previous block when both are
    /// [`ChatBlock::is_coalescible`] and share a role (§4.2). A reasoning
    /// block between two agent blocks is never coalescible itself, so its
    /// mere presence breaks the run: the agent block that follows starts a
    /// fresh entry rather than merging with the one before the reasoning
    /// block.
    pub fn append(&mut self, block: ChatBlock) {
        if block.is_coalescible() {
            if let Some(last) = self.blocks.last_mut() {
                if last.is_coalescible() && last.role == block.role {
                    last.text.push_str("\n\n");
                    last.text.push_str(&block.text);
                    self.bump();
                    return;
                }
            }
        }
        self.blocks.push(block);
        self.bump();
    }

    /// Append delta text to the most-recently opened block of `role`
    /// (used for streaming `item/agentMessage/delta` application). If the
    /// last block is not of `role`, a new block is opened with `delta` as
    /// its initial text.
    pub fn append_delta(&mut self, id: impl Into<String>, role: Role, delta: &str) {
        if let Some(last) = self.blocks.last_mut() {
            if last.role == role {
                last.text.push_str(delta);
                self.bump();
                return;
            }
        }
        self.blocks.push(ChatBlock::new(id, role, delta));
        self.bump();
    }

    /// Locate the block with `id` and replace its status (used when a
    /// locally-appended user message transitions `sending` -> `none`/`failed`).
    pub fn set_status(&mut self, id: &str, status: BlockStatus) -> bool {
        if let Some(b) = self.blocks.iter_mut().find(|b| b.id == id) {
            if b.status != status {
                b.status = status;
                self.bump();
                return true;
            }
        }
        false
    }

    /// Mark the most recently appended block as closed to further
    /// coalescing merges from subsequent `append` calls, by changing its
    /// role is not how closing works here — closing is modeled simply by
    /// the fact that once an `item/completed` arrives, the next `append`
    /// only merges by adjacency + shared role, which this transcript
    /// always checks. This helper exists so controllers have an explicit,
    /// named place to call when an item closes even though transcript
    /// state doesn't need to change for it.
    pub fn close_last(&mut self) {
        // No state transition required: coalescing is purely structural
        // (role + adjacency). Present for controller-side readability and
        // as a hook for future per-block "closed" tracking.
    }

    /// `UpsertReasoning` (§4.2): locate the block keyed
    /// `"reasoning:" + group_id`. If absent, append one. If present and the
    /// (trimmed) text differs, replace it in place. Returns whether the
    /// transcript changed.
    pub fn upsert_reasoning(&mut self, group_id: &str, text: &str) -> bool {
        let id = ChatBlock::reasoning_id(group_id);
        self.upsert_by_id(&id, Role::Reasoning, text)
    }

    /// Locate the block with `id`: if present and its (trimmed) text
    /// differs, replace it in place; if absent, append a new block with
    /// `role`. Used by log-tail accumulation and by [`Self::upsert_reasoning`].
    pub fn upsert_by_id(&mut self, id: &str, role: Role, text: &str) -> bool {
        if let Some(existing) = self.blocks.iter_mut().find(|b| b.id == id) {
            if existing.text.trim() == text.trim() {
                return false;
            }
            existing.text = text.to_string();
            self.bump();
            return true;
        }
        self.blocks.push(ChatBlock::new(id, role, text));
        self.bump();
        true
    }

    /// Drop all blocks, e.g. on `/clear` or session teardown.
    pub fn clear(&mut self) {
        if !self.blocks.is_empty() {
            self.blocks.clear();
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(text: &str) -> ChatBlock {
        ChatBlock::new(uuid::Uuid::new_v4().to_string(), Role::Agent, text)
    }

    fn reasoning(group: &str, text: &str) -> ChatBlock {
        ChatBlock::new(ChatBlock::reasoning_id(group), Role::Reasoning, text)
    }

    #[test]
    fn adjacent_agent_blocks_coalesce() {
        let mut t = Transcript::new();
        t.append(agent("First streamed answer."));
        t.append(agent("Second streamed answer."));
        assert_eq!(t.blocks().len(), 1);
        assert_eq!(t.blocks()[0].role, Role::Agent);
        assert_eq!(t.blocks()[0].text, "First streamed answer.\n\nSecond streamed answer.");
    }

    #[test]
    fn reasoning_breaks_coalescing_boundary() {
        let mut t = Transcript::new();
        t.append(agent("First"));
        t.append(reasoning("g1", "thinking"));
        t.append(agent("Second"));
        let roles: Vec<Role> = t.blocks().iter().map(|b| b.role).collect();
        assert_eq!(roles, vec![Role::Agent, Role::Reasoning, Role::Agent]);
        assert_eq!(t.blocks()[0].text, "First");
        assert_eq!(t.blocks()[2].text, "Second");
    }

    #[test]
    fn non_adjacent_reasoning_blocks_never_merge() {
        let mut t = Transcript::new();
        t.append(reasoning("g1", "a"));
        t.append(agent("mid"));
        t.append(reasoning("g1", "b"));
        // Two reasoning blocks sharing id g1 but separated by an agent block
        // are appended as distinct entries by `append` (reasoning isn't
        // coalescible); `upsert_reasoning` is the only path that merges by id.
        assert_eq!(t.blocks().len(), 3);
    }

    #[test]
    fn upsert_reasoning_is_idempotent() {
        let mut t = Transcript::new();
        let v0 = t.content_version();
        assert!(t.upsert_reasoning("g1", "hello"));
        let v1 = t.content_version();
        assert!(v1 > v0);
        assert!(!t.upsert_reasoning("g1", "hello"));
        assert_eq!(t.content_version(), v1, "no-op upsert must not bump content_version");
        assert_eq!(t.blocks().len(), 1);
    }

    #[test]
    fn upsert_reasoning_replaces_text_in_place() {
        let mut t = Transcript::new();
        t.upsert_reasoning("g1", "first");
        t.append(agent("unrelated"));
        assert!(t.upsert_reasoning("g1", "first updated"));
        let block = t.find(&ChatBlock::reasoning_id("g1")).unwrap();
        assert_eq!(block.text, "first updated");
        assert_eq!(t.blocks().len(), 2, "in-place replace must not duplicate the block");
    }

    #[test]
    fn upsert_reasoning_trims_before_comparing() {
        let mut t = Transcript::new();
        t.upsert_reasoning("g1", "hello");
        assert!(!t.upsert_reasoning("g1", "  hello  "));
    }

    #[test]
    fn set_status_transitions_and_bumps_once() {
        let mut t = Transcript::new();
        let mut b = ChatBlock::new("u1", Role::User, "hi");
        b.status = BlockStatus::Sending;
        t.blocks.push(b);
        assert!(t.set_status("u1", BlockStatus::None));
        assert!(!t.set_status("u1", BlockStatus::None), "same status is a no-op");
    }
}
