// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The orchestrator: the concrete single-threaded reducer the rest of the
//! core is described abstractly around (spec §5, §9 "Supplement —
//! Orchestrator"). One `Message` enum, one `apply` entry point, grounded on
//! the teacher's `dispatch`-style reducer: a typed message consumed by a
//! single function that mutates model state and returns follow-up tasks
//! for the caller to schedule, rather than awaiting anything itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::recents::RecentsState;
use crate::render::{AsyncViewportRenderer, Pipeline, RenderJob};
use crate::stream::{EventStreamController, ItemStreamController, LogTailController, TickResult};

/// One recents-machine event, wrapping [`RecentsState`]'s methods into a
/// single dispatchable shape.
#[derive(Debug, Clone)]
pub enum RecentsEvent {
    RunStarted { session: String, baseline_turn: String, at: DateTime<Utc> },
    RunCompleted { session: String, expected_turn: Option<String>, completion_turn: String, at: DateTime<Utc> },
    MetaObserved { session: String, observed_turn: String, at: DateTime<Utc> },
    RunCanceled { session: String },
    ReadyDismiss { session: String },
    SessionsPrune { present: HashSet<String> },
}

/// Outcome of a short-lived command task (send, approve, dismiss, kill,
/// interrupt, fetch — spec §5 "Short-lived command tasks") posted back to
/// the reducer.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub label: &'static str,
    pub result: Result<(), CoreError>,
}

/// The reducer's input alphabet.
pub enum Message {
    /// Drain one scheduling quantum from every active stream controller.
    Tick,
    Recents(RecentsEvent),
    /// A render job the UI wants scheduled (coalesced by the async renderer).
    ScheduleRender(RenderJob),
    /// The debounce timer armed by a previous mutation has elapsed.
    SaveFlushDue,
    CommandCompleted(CommandOutcome),
}

/// Work the reducer cannot perform itself (it never suspends) and hands
/// back to the caller to schedule (spec §5 "The main loop never suspends
/// inside a reducer; it returns a task to be scheduled externally").
pub enum FollowUpTask {
    /// Arm (or re-arm) the save-flush debounce timer.
    ScheduleSaveFlush(Duration),
    /// The debounce window elapsed with pending changes: persist this
    /// snapshot via `SessionServiceClient::app_state_update`.
    PersistAppState(crate::recents::RecentsSnapshot),
    /// A command failed; the caller should set a user-visible status string.
    ReportCommandError(CoreError),
}

/// Ticking every stream controller produced at least one change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSummary {
    pub log_tail: TickResult,
    pub event_stream: TickResult,
    pub item_stream: TickResult,
}

impl TickSummary {
    pub fn changed(&self) -> bool {
        self.log_tail.changed || self.event_stream.changed || self.item_stream.changed
    }
}

/// Wires the three stream controllers, the recents tracker, and the async
/// viewport renderer into one reducer (spec §9 Supplement). One
/// orchestrator instance corresponds to one open session's live view; the
/// recents tracker is intentionally session-spanning, matching the source
/// system's single global "recents" sidebar section.
pub struct Orchestrator {
    pub log_tail: LogTailController,
    pub event_stream: EventStreamController,
    pub item_stream: ItemStreamController,
    pub recents: RecentsState,
    pub renderer: AsyncViewportRenderer,
    save_debounce: Duration,
    save_pending: bool,
    save_flush_scheduled: bool,
}

impl Orchestrator {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            log_tail: LogTailController::new(config),
            event_stream: EventStreamController::new(config),
            item_stream: ItemStreamController::new(config),
            recents: RecentsState::new(),
            renderer: AsyncViewportRenderer::new(Arc::new(Pipeline::new(config))),
            save_debounce: config.save_debounce,
            save_pending: false,
            save_flush_scheduled: false,
        }
    }

    fn mark_dirty(&mut self, tasks: &mut Vec<FollowUpTask>) {
        self.save_pending = true;
        if !self.save_flush_scheduled {
            self.save_flush_scheduled = true;
            tasks.push(FollowUpTask::ScheduleSaveFlush(self.save_debounce));
        }
    }

    fn apply_recents_event(&mut self, event: RecentsEvent) -> bool {
        let result = match event {
            RecentsEvent::RunStarted { session, baseline_turn, at } => {
                self.recents.run_started(&session, &baseline_turn, at)
            }
            RecentsEvent::RunCompleted { session, expected_turn, completion_turn, at } => self.recents.run_completed(
                &session,
                expected_turn.as_deref(),
                &completion_turn,
                at,
            ),
            RecentsEvent::MetaObserved { session, observed_turn, at } => {
                self.recents.meta_observed(&session, &observed_turn, at)
            }
            RecentsEvent::RunCanceled { session } => self.recents.run_canceled(&session),
            RecentsEvent::ReadyDismiss { session } => self.recents.ready_dismiss(&session),
            RecentsEvent::SessionsPrune { present } => self.recents.sessions_prune(&present),
        };
        result.changed
    }

    /// The single reducer entry point: consume one message, mutate state,
    /// and return follow-up tasks for the caller to schedule.
    pub fn apply(&mut self, msg: Message) -> Vec<FollowUpTask> {
        let mut tasks = Vec::new();
        match msg {
            Message::Tick => {
                let (log_tail, _) = self.log_tail.consume_tick();
                let (event_stream, _) = self.event_stream.consume_tick();
                let (item_stream, _) = self.item_stream.consume_tick();
                let summary = TickSummary { log_tail, event_stream, item_stream };
                if summary.changed() {
                    self.mark_dirty(&mut tasks);
                }
            }
            Message::Recents(event) => {
                if self.apply_recents_event(event) {
                    self.mark_dirty(&mut tasks);
                }
            }
            Message::ScheduleRender(job) => {
                self.renderer.schedule(job);
            }
            Message::SaveFlushDue => {
                self.save_flush_scheduled = false;
                if self.save_pending {
                    self.save_pending = false;
                    tasks.push(FollowUpTask::PersistAppState(self.recents.snapshot()));
                }
            }
            Message::CommandCompleted(outcome) => {
                if let Err(err) = outcome.result {
                    tasks.push(FollowUpTask::ReportCommandError(err));
                } else {
                    self.mark_dirty(&mut tasks);
                }
            }
        }
        tasks
    }
}
