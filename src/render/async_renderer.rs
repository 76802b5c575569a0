// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Async viewport renderer: a single-slot `{in_flight, pending, completed}`
//! coalescing wrapper around the synchronous [`Pipeline`] (spec §4.4, §9
//! "Single-slot coalescing"). Exactly one worker task runs per renderer;
//! scheduling a job while one is already in flight overwrites the pending
//! slot instead of spawning another task.

use std::sync::{Arc, Mutex};

use crate::render::pipeline::{Pipeline, RenderRequest, RenderResult};

/// A render signature: two requests with the same signature are
/// observationally equivalent for coalescing purposes (spec glossary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSignature {
    pub width: u16,
    pub content_version: u64,
    pub selection_index: Option<usize>,
    pub timestamp_mode: &'static str,
    pub relative_bucket_secs: u64,
}

/// One deferred render job: the request plus the signature it was
/// scheduled with (for diagnostics / the coalescing invariant test).
pub struct RenderJob {
    pub signature: RenderSignature,
    pub request: RenderRequest,
}

struct Slot {
    in_flight: bool,
    pending: Option<RenderJob>,
    completed: Option<RenderResult>,
}

/// Wraps a [`Pipeline`] with the single-slot in-flight/pending/completed
/// state machine. Cloneable — all clones share the same slot and pipeline.
#[derive(Clone)]
pub struct AsyncViewportRenderer {
    pipeline: Arc<Pipeline>,
    slot: Arc<Mutex<Slot>>,
}

impl AsyncViewportRenderer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            slot: Arc::new(Mutex::new(Slot { in_flight: false, pending: None, completed: None })),
        }
    }

    /// `Schedule(job, pipeline)` (spec §4.4). If nothing is in flight,
    /// spawns the one worker task for this job. If a job is already in
    /// flight, the single pending slot is overwritten with `job` —
    /// coalescing guarantees at most one subsequent background render,
    /// carrying only the most recently scheduled signature.
    pub fn schedule(&self, job: RenderJob) {
        let mut slot = self.slot.lock().expect("render slot mutex poisoned");
        if slot.in_flight {
            slot.pending = Some(job);
            return;
        }
        slot.in_flight = true;
        drop(slot);
        self.spawn(job);
    }

    fn spawn(&self, job: RenderJob) {
        let pipeline = Arc::clone(&self.pipeline);
        let renderer = self.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || pipeline.render(&job.request))
                .await
                .expect("render worker task panicked");
            renderer.complete(result);
        });
    }

    fn complete(&self, result: RenderResult) {
        let next = {
            let mut slot = self.slot.lock().expect("render slot mutex poisoned");
            slot.completed = Some(result);
            match slot.pending.take() {
                Some(next) => {
                    slot.in_flight = true;
                    Some(next)
                }
                None => {
                    slot.in_flight = false;
                    None
                }
            }
        };
        if let Some(next) = next {
            self.spawn(next);
        }
    }

    /// `TakeCompleted() -> option<result>` (spec §4.4): drains at most one
    /// result and clears the slot.
    pub fn take_completed(&self) -> Option<RenderResult> {
        let mut slot = self.slot.lock().expect("render slot mutex poisoned");
        slot.completed.take()
    }

    #[cfg(test)]
    pub fn is_in_flight(&self) -> bool {
        self.slot.lock().unwrap().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ChatBlock, Role};
    use crate::config::CoreConfig;
    use crate::render::pipeline::Content;
    use std::collections::HashMap;

    fn signature(n: u64) -> RenderSignature {
        RenderSignature {
            width: 80,
            content_version: n,
            selection_index: None,
            timestamp_mode: "off",
            relative_bucket_secs: 1,
        }
    }

    fn request(text: &str) -> RenderRequest {
        RenderRequest::new(Content::Blocks {
            blocks: vec![ChatBlock::new("b1", Role::Agent, text)],
            block_meta_by_id: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn schedules_and_completes_a_single_job() {
        let pipeline = Arc::new(Pipeline::new(&CoreConfig::default()));
        let renderer = AsyncViewportRenderer::new(pipeline);
        renderer.schedule(RenderJob { signature: signature(1), request: request("hello") });

        let mut result = None;
        for _ in 0..50 {
            if let Some(r) = renderer.take_completed() {
                result = Some(r);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let result = result.expect("render should have completed");
        assert!(result.text.contains("hello"));
    }

    #[tokio::test]
    async fn take_completed_drains_the_slot_once() {
        let pipeline = Arc::new(Pipeline::new(&CoreConfig::default()));
        let renderer = AsyncViewportRenderer::new(pipeline);
        renderer.schedule(RenderJob { signature: signature(1), request: request("hi") });

        while renderer.take_completed().is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(renderer.take_completed().is_none(), "a second drain must see nothing new");
    }

    #[tokio::test]
    async fn scheduling_while_in_flight_coalesces_to_the_latest_job() {
        let pipeline = Arc::new(Pipeline::new(&CoreConfig::default()));
        let renderer = AsyncViewportRenderer::new(pipeline);

        renderer.schedule(RenderJob { signature: signature(1), request: request("first") });
        assert!(renderer.is_in_flight());
        for n in 2..6 {
            renderer.schedule(RenderJob { signature: signature(n), request: request("superseded") });
        }
        renderer.schedule(RenderJob { signature: signature(6), request: request("latest") });

        let mut last = None;
        for _ in 0..200 {
            if let Some(r) = renderer.take_completed() {
                last = Some(r);
            }
            if !renderer.is_in_flight() && last.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let last = last.expect("at least one completion expected");
        assert!(last.text.contains("latest"), "only the most recently scheduled job should survive coalescing");
    }
}
