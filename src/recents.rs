// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-session lifecycle tracker for "recent" runs: started -> ready ->
//! dismissed, with idempotent transitions, deterministic FIFO ordering,
//! dismissal cycles, and snapshot/restore (§4.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session currently believed to be running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningEntry {
    pub baseline_turn: String,
    pub started_at: DateTime<Utc>,
}

/// A session with a completed run awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyEntry {
    pub completion_turn: String,
    pub completed_at: DateTime<Utc>,
    pub seq: u64,
}

/// Outcome of applying one event, so observers can batch UI updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyResult {
    pub changed: bool,
    pub ready_enqueued: bool,
}

impl ApplyResult {
    const NONE: ApplyResult = ApplyResult { changed: false, ready_enqueued: false };
    const CHANGED: ApplyResult = ApplyResult { changed: true, ready_enqueued: false };
    const READY: ApplyResult = ApplyResult { changed: true, ready_enqueued: true };
}

/// A snapshot of the entire recents state, for persistence (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentsSnapshot {
    pub running: HashMap<String, RunningEntry>,
    pub ready: HashMap<String, ReadyEntry>,
    pub ready_queue: Vec<String>,
    pub dismissed_turn: HashMap<String, String>,
}

/// The event-sourced recents tracker.
#[derive(Debug, Clone, Default)]
pub struct RecentsState {
    running: HashMap<String, RunningEntry>,
    ready: HashMap<String, ReadyEntry>,
    ready_queue: Vec<String>,
    dismissed_turn: HashMap<String, String>,
    seq: u64,
}

impl RecentsState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }

    /// `RunStarted(session, baseline_turn, at)`.
    pub fn run_started(&mut self, session: &str, baseline_turn: &str, at: DateTime<Utc>) -> ApplyResult {
        if let Some(existing) = self.running.get(session) {
            if existing.baseline_turn == baseline_turn {
                // Idempotent: preserve started_at, no-op.
                return ApplyResult::NONE;
            }
        }
        self.running.insert(
            session.to_string(),
            RunningEntry { baseline_turn: baseline_turn.to_string(), started_at: at },
        );
        self.dismissed_turn.remove(session);
        ApplyResult::CHANGED
    }

    /// `RunCompleted(session, expected_turn?, completion_turn, at)`.
    pub fn run_completed(
        &mut self,
        session: &str,
        expected_turn: Option<&str>,
        completion_turn: &str,
        at: DateTime<Utc>,
    ) -> ApplyResult {
        let Some(running) = self.running.get(session) else {
            return ApplyResult::NONE;
        };
        if let Some(expected) = expected_turn {
            if expected != running.baseline_turn {
                return ApplyResult::NONE;
            }
        }
        if self.dismissed_turn.get(session).map(String::as_str) == Some(completion_turn) {
            return ApplyResult::NONE;
        }
        self.running.remove(session);
        let seq = self.next_seq();
        self.ready.insert(
            session.to_string(),
            ReadyEntry { completion_turn: completion_turn.to_string(), completed_at: at, seq },
        );
        self.ready_queue.push(session.to_string());
        tracing::debug!(session, seq, "run completed, enqueued to ready");
        ApplyResult::READY
    }

    /// `MetaObserved(session, observed_turn, at)` — same semantics as
    /// `RunCompleted` without an `expected_turn` check.
    pub fn meta_observed(&mut self, session: &str, observed_turn: &str, at: DateTime<Utc>) -> ApplyResult {
        self.run_completed(session, None, observed_turn, at)
    }

    /// `RunCanceled(session)` — drop from `running` only. Idempotent.
    pub fn run_canceled(&mut self, session: &str) -> ApplyResult {
        if self.running.remove(session).is_some() {
            ApplyResult::CHANGED
        } else {
            ApplyResult::NONE
        }
    }

    /// `ReadyDismiss(session)` — drop from `ready`, remember the completion
    /// turn so the same completion cannot re-enqueue. Idempotent.
    pub fn ready_dismiss(&mut self, session: &str) -> ApplyResult {
        let Some(entry) = self.ready.remove(session) else {
            return ApplyResult::NONE;
        };
        self.ready_queue.retain(|s| s != session);
        self.dismissed_turn.insert(session.to_string(), entry.completion_turn);
        ApplyResult::CHANGED
    }

    /// `SessionsPrune(present)` — remove any entries whose session is not present.
    pub fn sessions_prune(&mut self, present: &std::collections::HashSet<String>) -> ApplyResult {
        let mut changed = false;
        let before_running = self.running.len();
        self.running.retain(|s, _| present.contains(s));
        changed |= self.running.len() != before_running;

        let before_ready = self.ready.len();
        self.ready.retain(|s, _| present.contains(s));
        changed |= self.ready.len() != before_ready;
        if self.ready.len() != before_ready {
            self.ready_queue.retain(|s| self.ready.contains_key(s));
        }

        let before_dismissed = self.dismissed_turn.len();
        self.dismissed_turn.retain(|s, _| present.contains(s));
        changed |= self.dismissed_turn.len() != before_dismissed;

        if changed {
            ApplyResult::CHANGED
        } else {
            ApplyResult::NONE
        }
    }

    pub fn is_running(&self, session: &str) -> bool {
        self.running.contains_key(session)
    }

    pub fn is_ready(&self, session: &str) -> bool {
        self.ready.contains_key(session)
    }

    pub fn running_entry(&self, session: &str) -> Option<&RunningEntry> {
        self.running.get(session)
    }

    pub fn ready_entry(&self, session: &str) -> Option<&ReadyEntry> {
        self.ready.get(session)
    }

    /// Sessions with a ready completion, in FIFO order by `seq`, ties
    /// (only possible after a `Restore`) broken on ascending session id.
    pub fn ready_ids(&self) -> Vec<String> {
        let mut entries: Vec<(&String, u64)> =
            self.ready.iter().map(|(s, e)| (s, e.seq)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn snapshot(&self) -> RecentsSnapshot {
        RecentsSnapshot {
            running: self.running.clone(),
            ready: self.ready.clone(),
            ready_queue: self.ready_queue.clone(),
            dismissed_turn: self.dismissed_turn.clone(),
        }
    }

    /// Restore from a snapshot, normalizing it (§4.3):
    /// 1. collapse duplicate ids in `ready_queue`, keeping the lowest `seq`;
    /// 2. drop queue entries whose session is not in `ready`;
    /// 3. keep only non-empty `dismissed_turn` entries;
    /// 4. continue the `seq` counter past the maximum observed.
    ///
    /// Normalization is idempotent: `Restore(Snapshot(Restore(s)))` is a
    /// structural fixed point.
    pub fn restore(snapshot: RecentsSnapshot) -> Self {
        let ready = snapshot.ready;
        let dismissed_turn: HashMap<String, String> = snapshot
            .dismissed_turn
            .into_iter()
            .filter(|(_, turn)| !turn.is_empty())
            .collect();

        let mut seen = std::collections::HashSet::new();
        let mut best_seq: HashMap<String, u64> = HashMap::new();
        for session in &snapshot.ready_queue {
            let Some(entry) = ready.get(session) else { continue };
            best_seq
                .entry(session.clone())
                .and_modify(|s| *s = (*s).min(entry.seq))
                .or_insert(entry.seq);
        }
        let mut ready_queue: Vec<String> = Vec::new();
        for session in &snapshot.ready_queue {
            if !ready.contains_key(session) {
                continue;
            }
            if seen.insert(session.clone()) {
                ready_queue.push(session.clone());
            }
        }
        // Sort the deduplicated queue by each session's lowest observed seq
        // so iteration order matches `ready_ids()`'s FIFO contract.
        ready_queue.sort_by_key(|s| best_seq.get(s).copied().unwrap_or(u64::MAX));

        let max_seq = ready.values().map(|e| e.seq).max();
        let seq = max_seq.map(|m| m + 1).unwrap_or(0);

        Self {
            running: snapshot.running,
            ready,
            ready_queue,
            dismissed_turn,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn dismiss_then_recomplete_scenario() {
        let mut s = RecentsState::new();
        assert!(s.run_started("s1", "turn-u1", t(0)).changed);
        let r = s.run_completed("s1", Some("turn-u1"), "turn-a1", t(1));
        assert!(r.changed && r.ready_enqueued);
        assert!(s.ready_dismiss("s1").changed);
        assert!(!s.is_ready("s1"));

        let dup = s.run_completed("s1", Some("turn-u1"), "turn-a1", t(2));
        assert!(!dup.changed, "dismissed completion must not re-enqueue");

        assert!(s.run_started("s1", "turn-a1", t(3)).changed);
        let r2 = s.run_completed("s1", Some("turn-a1"), "turn-a2", t(4));
        assert!(r2.changed && r2.ready_enqueued, "new cycle after RunStarted re-enables enqueue");
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut s = RecentsState::new();
        s.run_started("s1", "turn-new", t(0));
        let r = s.run_completed("s1", Some("turn-old"), "turn-old", t(1));
        assert!(!r.changed);
        assert!(s.is_running("s1"));
        assert!(!s.is_ready("s1"));
    }

    #[test]
    fn prune_removes_untracked_sessions_only() {
        let mut s = RecentsState::new();
        s.run_started("s1", "t1", t(0));
        s.run_started("s2", "t2", t(0));
        s.run_completed("s1", Some("t1"), "t1c", t(1));
        s.ready_dismiss("s1");
        let mut present = std::collections::HashSet::new();
        present.insert("s2".to_string());
        let r = s.sessions_prune(&present);
        assert!(r.changed);
        assert!(!s.is_running("s1") && !s.is_ready("s1"));
        assert!(s.dismissed_turn.get("s1").is_none());
        assert!(s.is_running("s2"));
    }

    #[test]
    fn events_are_idempotent() {
        let mut s = RecentsState::new();
        s.run_started("s1", "t1", t(0));
        let r1 = s.run_completed("s1", Some("t1"), "t1c", t(1));
        assert!(r1.changed);
        let snap1 = s.snapshot();
        let r2 = s.run_completed("s1", Some("t1"), "t1c", t(1));
        assert!(!r2.changed);
        let snap2 = s.snapshot();
        assert_eq!(format!("{:?}", snap1.ready), format!("{:?}", snap2.ready));

        assert!(s.ready_dismiss("s1").changed);
        assert!(!s.ready_dismiss("s1").changed);

        s.run_started("s2", "t2", t(2));
        assert!(!s.run_started("s2", "t2", t(3)).changed, "same baseline is a no-op");
        assert!(s.run_canceled("s2").changed);
        assert!(!s.run_canceled("s2").changed);
    }

    #[test]
    fn fifo_ties_break_on_session_id() {
        let mut s = RecentsState::new();
        s.run_started("b", "tb", t(0));
        s.run_started("a", "ta", t(0));
        // Force identical seq by restoring a snapshot with a manual tie.
        let snapshot = RecentsSnapshot {
            running: HashMap::new(),
            ready: HashMap::from([
                ("b".to_string(), ReadyEntry { completion_turn: "x".into(), completed_at: t(1), seq: 5 }),
                ("a".to_string(), ReadyEntry { completion_turn: "y".into(), completed_at: t(1), seq: 5 }),
            ]),
            ready_queue: vec!["b".to_string(), "a".to_string()],
            dismissed_turn: HashMap::new(),
        };
        let restored = RecentsState::restore(snapshot);
        assert_eq!(restored.ready_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn snapshot_restore_round_trips_and_is_a_fixed_point() {
        let mut s = RecentsState::new();
        s.run_started("s1", "t1", t(0));
        s.run_completed("s1", Some("t1"), "t1c", t(1));
        s.run_started("s2", "t2", t(2));
        s.run_completed("s2", Some("t2"), "t2c", t(3));

        let snap = s.snapshot();
        let restored = RecentsState::restore(snap.clone());
        assert_eq!(restored.ready_ids(), s.ready_ids());

        let snap2 = restored.snapshot();
        let restored2 = RecentsState::restore(snap2.clone());
        // A second normalization pass is a fixed point.
        assert_eq!(format!("{:?}", snap2.ready_queue), format!("{:?}", restored2.snapshot().ready_queue));
    }

    #[test]
    fn restore_collapses_duplicate_queue_entries_keeping_lowest_seq() {
        let snapshot = RecentsSnapshot {
            running: HashMap::new(),
            ready: HashMap::from([(
                "s1".to_string(),
                ReadyEntry { completion_turn: "t".into(), completed_at: t(0), seq: 3 },
            )]),
            ready_queue: vec!["s1".to_string(), "s1".to_string(), "s1".to_string()],
            dismissed_turn: HashMap::new(),
        };
        let restored = RecentsState::restore(snapshot);
        assert_eq!(restored.ready_queue, vec!["s1".to_string()]);
    }

    #[test]
    fn restore_drops_queue_entries_not_in_ready_and_empty_dismissed_turns() {
        let snapshot = RecentsSnapshot {
            running: HashMap::new(),
            ready: HashMap::new(),
            ready_queue: vec!["ghost".to_string()],
            dismissed_turn: HashMap::from([
                ("s1".to_string(), String::new()),
                ("s2".to_string(), "real-turn".to_string()),
            ]),
        };
        let restored = RecentsState::restore(snapshot);
        assert!(restored.ready_queue.is_empty());
        assert!(!restored.dismissed_turn.contains_key("s1"));
        assert!(restored.dismissed_turn.contains_key("s2"));
    }

    #[test]
    fn restore_continues_seq_counter_past_maximum() {
        let snapshot = RecentsSnapshot {
            running: HashMap::new(),
            ready: HashMap::from([(
                "s1".to_string(),
                ReadyEntry { completion_turn: "t".into(), completed_at: t(0), seq: 10 },
            )]),
            ready_queue: vec!["s1".to_string()],
            dismissed_turn: HashMap::new(),
        };
        let mut restored = RecentsState::restore(snapshot);
        restored.run_started("s2", "tx", t(0));
        let r = restored.run_completed("s2", Some("tx"), "tx-done", t(1));
        assert!(r.changed);
        assert!(restored.ready_entry("s2").unwrap().seq > 10);
    }
}
