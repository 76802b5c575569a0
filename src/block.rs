// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The block model: the value types every transcript is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who (or what) produced a [`ChatBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
    Reasoning,
    Approval,
    ApprovalResolved,
    SessionNote,
    WorkspaceNote,
    WorktreeNote,
}

/// Local delivery status of a block, independent of its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    None,
    Sending,
    Failed,
}

impl Default for BlockStatus {
    fn default() -> Self {
        BlockStatus::None
    }
}

/// One entry in a transcript.
///
/// `id` is stable per *logical* block — reasoning blocks are keyed
/// `"reasoning:" + group-id` (see [`crate::reasoning`]) so a turn's
/// reasoning has exactly one addressable block across however many
/// segments were aggregated into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBlock {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub status: BlockStatus,
    pub created_at: Option<DateTime<Utc>>,
    /// Collapsed-preview flag, meaningful for reasoning blocks.
    pub collapsed: bool,
    pub request_id: Option<String>,
    pub session_id: Option<String>,
}

impl ChatBlock {
    pub fn new(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
            status: BlockStatus::None,
            created_at: None,
            collapsed: false,
            request_id: None,
            session_id: None,
        }
    }

    pub fn with_status(mut self, status: BlockStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Prefix applied to reasoning-group ids to derive a block id.
    pub const REASONING_ID_PREFIX: &'static str = "reasoning:";

    pub fn reasoning_id(group_id: &str) -> String {
        format!("{}{}", Self::REASONING_ID_PREFIX, group_id)
    }

    pub fn is_reasoning(&self) -> bool {
        self.role == Role::Reasoning
    }

    /// True for roles whose adjacent same-role blocks are allowed to
    /// coalesce (see [`crate::transcript`]). Reasoning blocks never
    /// coalesce with each other — each is addressed individually via
    /// [`Self::reasoning_id`] and updated in place.
    pub fn is_coalescible(&self) -> bool {
        matches!(self.role, Role::Agent)
    }
}
