// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Error kinds surfaced across the orchestration core.
//!
//! Transcript and recents apply functions never return errors (malformed
//! input is treated as no-change); `CoreError` is reserved for operations
//! that have a genuine failure mode a caller needs to see: stream/command
//! I/O, deadlines, validation, staleness, and resource unavailability.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout(_))
    }
}
