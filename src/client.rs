// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `SessionServiceClient`: the external-service trait boundary the core
//! consumes (spec §6). Kept as a trait, mirroring how the teacher isolates
//! its model provider behind `sven_model::ModelProvider`, so tests can
//! substitute an in-memory fake instead of a real HTTP/streaming client.
//!
//! Method names are conceptual, not wire names — a concrete implementation
//! maps each of these onto whatever RPC/HTTP surface the real service
//! exposes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::recents::RecentsSnapshot;
use crate::sidebar::{SessionMeta, Workspace, WorkflowRun};
use crate::stream::StreamHandle;

#[derive(Debug, Clone, Default)]
pub struct SessionListQuery {
    pub workspace_id: Option<String>,
    pub include_dismissed: bool,
    pub include_workflow_owned: bool,
}

#[derive(Debug, Clone)]
pub struct TranscriptPage {
    pub lines: Vec<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub dismissed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Decline,
}

#[derive(Debug, Clone)]
pub struct ApprovalSummary {
    pub id: String,
    pub session_id: String,
    pub summary: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Worktree {
    pub id: String,
    pub workspace_id: String,
    pub path: String,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteScope {
    Session,
    Workspace,
    Worktree,
}

#[derive(Debug, Clone)]
pub struct Note {
    pub id: String,
    pub scope: NoteScope,
    pub owner_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProviderOption {
    pub id: String,
    pub label: String,
    pub description: String,
}

/// Persisted app-state document (spec §6 "Persisted state"): the flat
/// document the orchestrator reads at startup and writes back, debounced,
/// after mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppStateDocument {
    pub active_workspace_group_ids: Vec<String>,
    pub sidebar_expansion: std::collections::HashMap<String, bool>,
    pub sort_state: Value,
    pub recents: RecentsSnapshot,
    pub provider_badge_overrides: std::collections::HashMap<String, String>,
}

/// The capabilities the orchestration core requires from the session
/// service (spec §6). Every operation accepts a `deadline` standing in for
/// the cancellation context the distilled spec describes; streaming
/// openers return a [`StreamHandle`] which already bundles its own cancel
/// handle (spec §9 "Channel + cancel pairs"), so no separate cancel value
/// is threaded alongside it here.
#[async_trait]
pub trait SessionServiceClient: Send + Sync {
    async fn list_sessions(&self, query: SessionListQuery, deadline: Duration) -> Result<Vec<SessionMeta>, CoreError>;
    async fn list_workspaces(&self, deadline: Duration) -> Result<Vec<Workspace>, CoreError>;

    async fn tail(&self, session_id: &str, lines: usize, deadline: Duration) -> Result<TranscriptPage, CoreError>;
    async fn history(&self, session_id: &str, lines: usize, deadline: Duration) -> Result<TranscriptPage, CoreError>;

    async fn open_log_tail(&self, session_id: &str) -> Result<StreamHandle<String>, CoreError>;
    async fn open_event_stream(&self, session_id: &str) -> Result<StreamHandle<(String, Value)>, CoreError>;
    async fn open_item_stream(&self, session_id: &str) -> Result<StreamHandle<Value>, CoreError>;

    async fn kill(&self, session_id: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn mark_exited(&self, session_id: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn mark_exited_bulk(&self, session_ids: &[String], deadline: Duration) -> Result<(), CoreError>;
    async fn dismiss(&self, session_id: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn undismiss(&self, session_id: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn update(&self, session_id: &str, update: SessionUpdate, deadline: Duration) -> Result<(), CoreError>;
    async fn send(&self, session_id: &str, text: &str, deadline: Duration) -> Result<String, CoreError>;
    async fn interrupt(&self, session_id: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn approve(
        &self,
        session_id: &str,
        approval_id: &str,
        decision: ApprovalDecision,
        deadline: Duration,
    ) -> Result<(), CoreError>;
    async fn list_approvals(&self, session_id: &str, deadline: Duration) -> Result<Vec<ApprovalSummary>, CoreError>;

    async fn workspace_create(&self, name: &str, deadline: Duration) -> Result<Workspace, CoreError>;
    async fn workspace_delete(&self, workspace_id: &str, deadline: Duration) -> Result<(), CoreError>;

    async fn worktree_list(&self, workspace_id: &str, deadline: Duration) -> Result<Vec<Worktree>, CoreError>;
    async fn worktree_create(&self, workspace_id: &str, path: &str, branch: &str, deadline: Duration) -> Result<Worktree, CoreError>;
    async fn worktree_delete(&self, worktree_id: &str, deadline: Duration) -> Result<(), CoreError>;

    async fn workflow_list(&self, workspace_id: &str, deadline: Duration) -> Result<Vec<WorkflowRun>, CoreError>;
    async fn workflow_create(&self, workspace_id: &str, template_id: &str, deadline: Duration) -> Result<WorkflowRun, CoreError>;
    async fn workflow_delete(&self, workflow_id: &str, deadline: Duration) -> Result<(), CoreError>;

    async fn note_list(&self, scope: NoteScope, owner_id: &str, deadline: Duration) -> Result<Vec<Note>, CoreError>;
    async fn note_create(&self, scope: NoteScope, owner_id: &str, text: &str, deadline: Duration) -> Result<Note, CoreError>;
    async fn note_update(&self, note_id: &str, text: &str, deadline: Duration) -> Result<(), CoreError>;
    async fn note_delete(&self, note_id: &str, deadline: Duration) -> Result<(), CoreError>;

    async fn app_state_get(&self, deadline: Duration) -> Result<AppStateDocument, CoreError>;
    async fn app_state_update(&self, state: &AppStateDocument, deadline: Duration) -> Result<(), CoreError>;

    async fn provider_options(&self, deadline: Duration) -> Result<Vec<ProviderOption>, CoreError>;
}
