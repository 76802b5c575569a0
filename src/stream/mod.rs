// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Stream controllers: event/item/log-tail consumers that produce a
//! coalesced block timeline from out-of-order, duplicate-prone provider
//! events (§4.1).

pub mod controller;
pub mod event;

pub use controller::{
    CancelHandle, EventStreamController, ItemStreamController, LogTailController, StreamHandle,
    TickResult,
};
pub use event::{extract_turn_id, is_turn_completed, parse_provider_event, parse_stream_item, ProviderEvent, StreamItem};
