// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The synchronous render pipeline: `Render(RenderRequest) -> RenderResult`.
//!
//! Produces wrapped terminal text plus per-block hit-region spans, backed
//! by the two-tier LRU cache in [`crate::render::cache`]. No glyph-level
//! rendering fidelity or markdown rendering is attempted here — those are
//! an external collaborator's concern; this pipeline only wraps text and
//! tracks geometry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::block::{BlockStatus, ChatBlock, Role};
use crate::config::CoreConfig;
use crate::render::cache::{hash_fields, CacheKey, DigestCache};

/// A control hit-region a block may expose (copy, pin, expand/collapse, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Copy,
    Pin,
    ExpandCollapse,
    ApproveDecline,
    NotesFilter,
    Custom(String),
}

impl ControlKind {
    fn label(&self) -> String {
        match self {
            ControlKind::Copy => "[Copy]".to_string(),
            ControlKind::Pin => "[Pin]".to_string(),
            ControlKind::ExpandCollapse => "[Expand/Collapse]".to_string(),
            ControlKind::ApproveDecline => "[Approve/Decline]".to_string(),
            ControlKind::NotesFilter => "[Notes]".to_string(),
            ControlKind::Custom(name) => format!("[{name}]"),
        }
    }

    fn key_fragment(&self) -> String {
        match self {
            ControlKind::Copy => "copy".to_string(),
            ControlKind::Pin => "pin".to_string(),
            ControlKind::ExpandCollapse => "expand_collapse".to_string(),
            ControlKind::ApproveDecline => "approve_decline".to_string(),
            ControlKind::NotesFilter => "notes_filter".to_string(),
            ControlKind::Custom(name) => format!("custom:{name}"),
        }
    }
}

/// Presentation-only metadata for a block: pinned flag plus the controls
/// it should expose. Distinct from [`ChatBlock`] because it is UI state,
/// not transcript content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMeta {
    pub pinned: bool,
    pub controls: Vec<ControlKind>,
}

impl BlockMeta {
    fn hash_fragment(&self) -> String {
        let mut s = if self.pinned { "pinned;".to_string() } else { String::new() };
        for c in &self.controls {
            s.push_str(&c.key_fragment());
            s.push(';');
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    Absolute,
    Relative,
    Off,
}

impl TimestampMode {
    fn as_str(&self) -> &'static str {
        match self {
            TimestampMode::Absolute => "absolute",
            TimestampMode::Relative => "relative",
            TimestampMode::Off => "off",
        }
    }
}

/// Either a chat-style block list or a raw help/debug string (spec §4.4).
#[derive(Debug, Clone)]
pub enum Content {
    Blocks { blocks: Vec<ChatBlock>, block_meta_by_id: HashMap<String, BlockMeta> },
    Raw { content: String, escape_markdown: bool },
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub width: u16,
    pub max_lines: Option<usize>,
    pub selected_block_index: Option<usize>,
    pub content: Content,
    pub timestamp_mode: TimestampMode,
    pub timestamp_now: DateTime<Utc>,
}

impl RenderRequest {
    pub fn new(content: Content) -> Self {
        Self {
            width: 80,
            max_lines: None,
            selected_block_index: None,
            content,
            timestamp_mode: TimestampMode::Off,
            timestamp_now: Utc::now(),
        }
    }
}

/// A control's hit region within the rendered output. `line == -1` means
/// the control was clipped away by `max_lines` truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHit {
    pub kind: ControlKind,
    pub line: i64,
}

/// Per-block line geometry. `start_line`/`end_line` are `-1` when the
/// entire block has been truncated out of the emitted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub block_id: String,
    pub start_line: i64,
    pub end_line: i64,
    pub controls: Vec<ControlHit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub text: String,
    pub lines: Vec<String>,
    pub plain_lines: Vec<String>,
    pub spans: Vec<BlockSpan>,
}

struct RenderedBlock {
    lines: Vec<String>,
    /// Controls, each at a line offset relative to this block's own lines.
    controls: Vec<(ControlKind, usize)>,
}

/// Strip ANSI CSI escape sequences (`ESC [ ... letter`) from a line.
fn strip_ansi(line: &str) -> String {
    let ansi = regex::Regex::new("\u{1b}\\[[0-9;]*[A-Za-z]").expect("static ansi regex");
    ansi.replace_all(line, "").into_owned()
}

fn wrap_paragraph(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
        if candidate.width() > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    text.split('\n').flat_map(|para| wrap_paragraph(para, width)).collect()
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Agent => "Agent",
        Role::System => "System",
        Role::Reasoning => "Thinking",
        Role::Approval => "Approval",
        Role::ApprovalResolved => "Approval",
        Role::SessionNote => "Session note",
        Role::WorkspaceNote => "Workspace note",
        Role::WorktreeNote => "Worktree note",
    }
}

fn status_suffix(status: BlockStatus) -> &'static str {
    match status {
        BlockStatus::None => "",
        BlockStatus::Sending => " (sending...)",
        BlockStatus::Failed => " (failed)",
    }
}

fn relative_label(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created_at) = created_at else { return String::new() };
    let secs = (now - created_at).num_seconds().max(0);
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

fn bucket_now(now: DateTime<Utc>, bucket: Duration) -> i64 {
    let bucket_secs = bucket.as_secs().max(1) as i64;
    (now.timestamp().max(0) / bucket_secs) * bucket_secs
}

/// Owns the block and result render caches and produces [`RenderResult`]s.
pub struct Pipeline {
    block_cache: DigestCache<RenderedBlockPayload>,
    result_cache: DigestCache<RenderResult>,
    relative_bucket: Duration,
}

/// Cacheable, cloneable form of [`RenderedBlock`] (the original holds no
/// `Clone` requirement internally, but cache values must be `Clone`).
#[derive(Clone)]
struct RenderedBlockPayload {
    lines: Vec<String>,
    controls: Vec<(ControlKind, usize)>,
}

impl Pipeline {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            block_cache: DigestCache::new(config.block_cache_capacity),
            result_cache: DigestCache::new(config.result_cache_capacity),
            relative_bucket: config.relative_bucket,
        }
    }

    fn timestamp_bucket_fragment(&self, req: &RenderRequest) -> String {
        match req.timestamp_mode {
            TimestampMode::Relative => bucket_now(req.timestamp_now, self.relative_bucket).to_string(),
            TimestampMode::Absolute | TimestampMode::Off => String::new(),
        }
    }

    fn block_cache_key(
        &self,
        block: &ChatBlock,
        meta: &BlockMeta,
        width: u16,
        selected: bool,
        timestamp_mode: TimestampMode,
        timestamp_bucket: &str,
    ) -> CacheKey {
        hash_fields(&[
            "role", &format!("{:?}", block.role),
            "text", &block.text,
            "status", &format!("{:?}", block.status),
            "collapsed", &block.collapsed.to_string(),
            "width", &width.to_string(),
            "selected", &selected.to_string(),
            "timestamp_mode", timestamp_mode.as_str(),
            "timestamp_bucket", timestamp_bucket,
            "meta", &meta.hash_fragment(),
        ])
    }

    fn render_block(
        &self,
        block: &ChatBlock,
        meta: &BlockMeta,
        width: u16,
        selected: bool,
        timestamp_mode: TimestampMode,
        timestamp_bucket: &str,
        now: DateTime<Utc>,
    ) -> RenderedBlockPayload {
        let key = self.block_cache_key(block, meta, width, selected, timestamp_mode, timestamp_bucket);
        self.block_cache.get_or_insert_with(key, || {
            let width = width.max(1) as usize;
            let timestamp = match timestamp_mode {
                TimestampMode::Absolute => block
                    .created_at
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default(),
                TimestampMode::Relative => relative_label(block.created_at, now),
                TimestampMode::Off => String::new(),
            };
            let mut header = role_label(block.role).to_string();
            if meta.pinned {
                header.push_str(" \u{1F4CC}");
            }
            if !timestamp.is_empty() {
                header.push_str("  ");
                header.push_str(&timestamp);
            }
            header.push_str(status_suffix(block.status));
            if selected {
                header.push_str("  <");
            }
            if !meta.controls.is_empty() {
                header.push_str("  ");
                header.push_str(&meta.controls.iter().map(|c| c.label()).collect::<Vec<_>>().join(" "));
            }

            let body = if block.collapsed {
                Vec::new()
            } else {
                wrap_text(&block.text, width)
            };

            let mut lines = Vec::with_capacity(body.len() + 1);
            lines.push(header);
            lines.extend(body);

            let controls: Vec<(ControlKind, usize)> =
                meta.controls.iter().cloned().map(|c| (c, 0)).collect();

            RenderedBlockPayload { lines, controls }
        })
    }

    fn render_blocks(
        &self,
        blocks: &[ChatBlock],
        block_meta_by_id: &HashMap<String, BlockMeta>,
        req: &RenderRequest,
    ) -> (Vec<String>, Vec<BlockSpan>) {
        let empty_meta = BlockMeta::default();
        let timestamp_bucket = self.timestamp_bucket_fragment(req);
        let mut lines = Vec::new();
        let mut spans = Vec::new();
        for (idx, block) in blocks.iter().enumerate() {
            let meta = block_meta_by_id.get(&block.id).unwrap_or(&empty_meta);
            let selected = req.selected_block_index == Some(idx);
            let rendered = self.render_block(
                block,
                meta,
                req.width,
                selected,
                req.timestamp_mode,
                &timestamp_bucket,
                req.timestamp_now,
            );
            let start = lines.len() as i64;
            lines.extend(rendered.lines.iter().cloned());
            let end = lines.len() as i64 - 1;
            let controls = rendered
                .controls
                .iter()
                .map(|(kind, offset)| ControlHit { kind: kind.clone(), line: start + *offset as i64 })
                .collect();
            spans.push(BlockSpan { block_id: block.id.clone(), start_line: start, end_line: end, controls });
        }
        (lines, spans)
    }

    /// Drop the oldest lines until `lines.len() <= max_lines`, adjusting
    /// spans in place; controls whose line fell in the dropped range (or
    /// whose whole block was dropped) are invalidated to `-1`.
    fn truncate(lines: Vec<String>, mut spans: Vec<BlockSpan>, max_lines: usize) -> (Vec<String>, Vec<BlockSpan>) {
        if lines.len() <= max_lines {
            return (lines, spans);
        }
        let dropped = lines.len() - max_lines;
        let lines = lines.into_iter().skip(dropped).collect::<Vec<_>>();
        for span in &mut spans {
            let adjust = |line: i64| -> i64 {
                if line < 0 {
                    return -1;
                }
                let shifted = line - dropped as i64;
                if shifted < 0 {
                    -1
                } else {
                    shifted
                }
            };
            for control in &mut span.controls {
                control.line = adjust(control.line);
            }
            if span.end_line < dropped as i64 {
                span.start_line = -1;
                span.end_line = -1;
            } else {
                span.start_line = adjust(span.start_line).max(0);
                span.end_line = adjust(span.end_line);
            }
        }
        (lines, spans)
    }

    fn result_cache_key(&self, req: &RenderRequest) -> CacheKey {
        let mut fields: Vec<String> = vec![
            req.width.to_string(),
            req.max_lines.map(|n| n.to_string()).unwrap_or_default(),
            req.selected_block_index.map(|n| n.to_string()).unwrap_or_default(),
            req.timestamp_mode.as_str().to_string(),
            self.timestamp_bucket_fragment(req),
        ];
        match &req.content {
            Content::Blocks { blocks, block_meta_by_id } => {
                let empty_meta = BlockMeta::default();
                let timestamp_bucket = self.timestamp_bucket_fragment(req);
                for (idx, block) in blocks.iter().enumerate() {
                    let meta = block_meta_by_id.get(&block.id).unwrap_or(&empty_meta);
                    let selected = req.selected_block_index == Some(idx);
                    let key = self.block_cache_key(
                        block,
                        meta,
                        req.width,
                        selected,
                        req.timestamp_mode,
                        &timestamp_bucket,
                    );
                    fields.push(hex::encode(key));
                }
            }
            Content::Raw { content, escape_markdown } => {
                fields.push("raw".to_string());
                fields.push(content.clone());
                fields.push(escape_markdown.to_string());
            }
        }
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        hash_fields(&refs)
    }

    fn render_uncached(&self, req: &RenderRequest) -> RenderResult {
        let (mut lines, mut spans) = match &req.content {
            Content::Blocks { blocks, block_meta_by_id } => self.render_blocks(blocks, block_meta_by_id, req),
            Content::Raw { content, escape_markdown } => {
                let width = req.width.max(1) as usize;
                let rendered = if *escape_markdown {
                    content.replace('`', "\\`").replace('*', "\\*").replace('_', "\\_")
                } else {
                    content.clone()
                };
                (wrap_text(&rendered, width), Vec::new())
            }
        };
        if let Some(max_lines) = req.max_lines {
            let truncated = Self::truncate(std::mem::take(&mut lines), std::mem::take(&mut spans), max_lines);
            lines = truncated.0;
            spans = truncated.1;
        }
        let plain_lines: Vec<String> = lines.iter().map(|l| strip_ansi(l)).collect();
        let text = lines.join("\n");
        RenderResult { text, lines, plain_lines, spans }
    }

    /// `Render(RenderRequest) -> RenderResult` (spec §4.4), backed by the
    /// whole-result cache.
    pub fn render(&self, req: &RenderRequest) -> RenderResult {
        let key = self.result_cache_key(req);
        self.result_cache.get_or_insert_with(key, || self.render_uncached(req))
    }
}
