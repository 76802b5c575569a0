// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Render pipeline: synchronous block/text rendering with a two-tier LRU
//! cache, plus an async viewport renderer that coalesces background jobs
//! onto a single in-flight slot (spec §4.4).

pub mod async_renderer;
pub mod cache;
pub mod pipeline;

pub use async_renderer::{AsyncViewportRenderer, RenderJob, RenderSignature};
pub use pipeline::{
    BlockMeta, BlockSpan, Content, ControlHit, ControlKind, Pipeline, RenderRequest, RenderResult,
    TimestampMode,
};
