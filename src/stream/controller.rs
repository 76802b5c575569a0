// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Stream controllers: the three sibling consumers (log-tail, structured
//! event, item stream) that turn out-of-order, duplicate-prone provider
//! events into a coalesced block timeline.
//!
//! All three share the same observable contract (§4.1) and the same
//! internal bookkeeping — generation counter, ring buffer, cancel handle,
//! synthesized transcript — via [`ControllerState`]; they differ only in
//! how a raw payload is turned into transcript mutations.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::block::{BlockStatus, ChatBlock, Role};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::reasoning::ReasoningAccumulator;
use crate::stream::event::{parse_provider_event, parse_stream_item, ProviderEvent, StreamItem};
use crate::transcript::Transcript;

/// An owned cancellation callback. Dropping it cancels, matching Design
/// Notes §9's "channel + cancel pairs" guidance: the resource cancels
/// whether it is explicitly replaced or simply goes out of scope.
pub struct CancelHandle(Option<Box<dyn FnOnce() + Send>>);

impl CancelHandle {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").field("armed", &self.0.is_some()).finish()
    }
}

/// A receive endpoint paired with its cancellation callback — one owned
/// resource, exchanged atomically by `SetStream`.
pub struct StreamHandle<T> {
    pub rx: mpsc::Receiver<T>,
    pub cancel: CancelHandle,
}

impl<T> StreamHandle<T> {
    pub fn new(rx: mpsc::Receiver<T>, cancel: CancelHandle) -> Self {
        Self { rx, cancel }
    }
}

/// Result of draining one scheduling quantum via `ConsumeTick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    pub changed: bool,
    pub closed: bool,
}

/// Bound on events drained per `ConsumeTick` call, so the single-threaded
/// scheduler never blocks longer than O(number-drained-events) (§4.1).
const TICK_QUANTUM: usize = 256;

/// Shared bookkeeping behind all three stream controllers.
struct ControllerState<T> {
    handle: Option<StreamHandle<T>>,
    generation: u64,
    ring: VecDeque<T>,
    ring_capacity: usize,
    error: Option<CoreError>,
    transcript: Transcript,
}

impl<T: Clone> ControllerState<T> {
    fn new(ring_capacity: usize) -> Self {
        Self {
            handle: None,
            generation: 0,
            ring: VecDeque::with_capacity(ring_capacity.min(64)),
            ring_capacity,
            error: None,
            transcript: Transcript::new(),
        }
    }

    /// Replace the active input. Bumps `generation`, drops (and thus
    /// cancels) the prior handle, and clears any pending error.
    fn set_stream(&mut self, handle: StreamHandle<T>) {
        self.generation += 1;
        tracing::debug!(generation = self.generation, "stream replaced");
        self.handle = Some(handle);
        self.error = None;
    }

    fn remember(&mut self, raw: T) {
        if self.ring.len() == self.ring_capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(raw);
    }

    /// Drain up to one quantum of pending payloads, applying `apply` to
    /// each. Returns whether anything changed and whether the stream
    /// closed during this tick.
    fn consume_tick(&mut self, mut apply: impl FnMut(&mut Transcript, T)) -> TickResult {
        let mut changed = false;
        let mut closed = false;
        let before = self.transcript.content_version();

        if let Some(handle) = self.handle.as_mut() {
            for _ in 0..TICK_QUANTUM {
                match handle.rx.try_recv() {
                    Ok(raw) => {
                        self.remember(raw.clone());
                        apply(&mut self.transcript, raw);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }

        if closed {
            tracing::debug!(generation = self.generation, "stream closed during tick");
            self.handle = None;
        }
        changed = changed || self.transcript.content_version() != before;
        TickResult { changed, closed }
    }

    fn take_error(&mut self) -> Option<CoreError> {
        self.error.take()
    }

    fn fail(&mut self, err: CoreError) {
        tracing::warn!(generation = self.generation, %err, "stream controller failed");
        self.error = Some(err);
        self.handle = None;
    }
}

// ── Log-tail controller ────────────────────────────────────────────────────

/// Consumes opaque lines and appends them to a system-role block, subject
/// to the scrollback cap (`ring_capacity` / `config.stream_ring_capacity`).
pub struct LogTailController {
    state: ControllerState<String>,
    current_block_id: Option<String>,
}

impl LogTailController {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            state: ControllerState::new(config.stream_ring_capacity),
            current_block_id: None,
        }
    }

    pub fn set_stream(&mut self, handle: StreamHandle<String>) {
        self.state.set_stream(handle);
        self.current_block_id = None;
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn fail(&mut self, err: CoreError) {
        self.state.fail(err);
    }

    pub fn consume_tick(&mut self) -> (TickResult, Option<CoreError>) {
        let current_block_id = &mut self.current_block_id;
        let result = self.state.consume_tick(|transcript, line| {
            let id = current_block_id
                .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
                .clone();
            let text = match transcript.find(&id) {
                Some(existing) if !existing.text.is_empty() => format!("{}\n{}", existing.text, line),
                _ => line,
            };
            transcript.upsert_by_id(&id, Role::System, &text);
        });
        (result, self.state.take_error())
    }

    pub fn blocks(&self) -> &[ChatBlock] {
        self.state.transcript.blocks()
    }

    pub fn append_user_message(&mut self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.state
            .transcript
            .append(ChatBlock::new(id.clone(), Role::User, text).with_status(BlockStatus::Sending));
        id
    }
}

// ── Structured event-stream controller ─────────────────────────────────────

/// Consumes `(method, params)` pairs from the `codex-event` stream.
pub struct EventStreamController {
    state: ControllerState<(String, Value)>,
    open_agent_item: Option<String>,
    reasoning: ReasoningAccumulator,
}

impl EventStreamController {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            state: ControllerState::new(config.stream_ring_capacity),
            open_agent_item: None,
            reasoning: ReasoningAccumulator::new(),
        }
    }

    pub fn set_stream(&mut self, handle: StreamHandle<(String, Value)>) {
        self.state.set_stream(handle);
        self.open_agent_item = None;
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn fail(&mut self, err: CoreError) {
        self.state.fail(err);
    }

    pub fn blocks(&self) -> &[ChatBlock] {
        self.state.transcript.blocks()
    }

    pub fn consume_tick(&mut self) -> (TickResult, Option<CoreError>) {
        let open_agent_item = &mut self.open_agent_item;
        let reasoning = &mut self.reasoning;
        let result = self.state.consume_tick(|transcript, (method, params)| {
            match parse_provider_event(&method, &params) {
                ProviderEvent::AgentItemStarted { item_id } => {
                    *open_agent_item = Some(item_id.clone());
                    transcript.append(ChatBlock::new(item_id, Role::Agent, ""));
                }
                ProviderEvent::AgentMessageDelta { delta } => {
                    let id = open_agent_item
                        .clone()
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    transcript.append_delta(id, Role::Agent, &delta);
                }
                ProviderEvent::AgentItemCompleted { item_id } => {
                    if open_agent_item.as_deref() == Some(item_id.as_str()) {
                        *open_agent_item = None;
                    }
                }
                ProviderEvent::ReasoningUpdated { item_id, summary } => {
                    reasoning.feed(Some(&item_id), &summary, transcript);
                }
                ProviderEvent::TurnCompleted { .. } => {
                    reasoning.reset();
                    *open_agent_item = None;
                }
                ProviderEvent::Other(_) => {}
            }
        });
        (result, self.state.take_error())
    }

    pub fn append_user_message(&mut self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.state
            .transcript
            .append(ChatBlock::new(id.clone(), Role::User, text).with_status(BlockStatus::Sending));
        id
    }

    pub fn set_message_status(&mut self, id: &str, status: BlockStatus) -> bool {
        self.state.transcript.set_status(id, status)
    }
}

// ── Item-stream controller ─────────────────────────────────────────────────

/// Consumes `item-stream` entries: maps shaped `{type: "assistant" | "result" | "user", ...}`.
pub struct ItemStreamController {
    state: ControllerState<Value>,
}

impl ItemStreamController {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            state: ControllerState::new(config.stream_ring_capacity),
        }
    }

    pub fn set_stream(&mut self, handle: StreamHandle<Value>) {
        self.state.set_stream(handle);
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn fail(&mut self, err: CoreError) {
        self.state.fail(err);
    }

    pub fn blocks(&self) -> &[ChatBlock] {
        self.state.transcript.blocks()
    }

    pub fn consume_tick(&mut self) -> (TickResult, Option<CoreError>) {
        let result = self.state.consume_tick(|transcript, raw| {
            match parse_stream_item(&raw) {
                StreamItem::Assistant { text } | StreamItem::Result { text } => {
                    transcript.append(ChatBlock::new(uuid::Uuid::new_v4().to_string(), Role::Agent, text));
                }
                StreamItem::User { text } => {
                    transcript.append(ChatBlock::new(uuid::Uuid::new_v4().to_string(), Role::User, text));
                }
                StreamItem::Other(_) => {}
            }
        });
        (result, self.state.take_error())
    }

    pub fn append_user_message(&mut self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.state
            .transcript
            .append(ChatBlock::new(id.clone(), Role::User, text).with_status(BlockStatus::Sending));
        id
    }
}
