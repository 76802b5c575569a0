// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Boundary parsing: opaque provider payloads in, tagged variants out.
//!
//! Per Design Notes §9, the core never leaks dynamic JSON maps past this
//! module — every raw event or item is classified once, here, into a typed
//! variant the stream controllers can match on exhaustively.

use serde_json::Value;

/// A structured event from the `codex-event` stream, classified from its
/// raw `method`/`params` shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// `item/started` carrying an agent item: open a new agent block keyed
    /// by `item_id`.
    AgentItemStarted { item_id: String },
    /// `item/agentMessage/delta`: append to the most-recently opened agent block.
    AgentMessageDelta { delta: String },
    /// `item/completed` carrying an agent item: close that agent block.
    AgentItemCompleted { item_id: String },
    /// `item/started` or `item/updated` carrying a reasoning item.
    ReasoningUpdated { item_id: String, summary: String },
    /// Any spelling of `turn/completed`: ends the current turn.
    TurnCompleted { turn_id: Option<String> },
    /// Recognized shape with no core-relevant effect, or unrecognized.
    Other(Value),
}

/// Parse a raw `(method, params)` pair into a [`ProviderEvent`].
pub fn parse_provider_event(method: &str, params: &Value) -> ProviderEvent {
    let norm = normalize_method(method);
    if is_turn_completed(&norm) {
        return ProviderEvent::TurnCompleted {
            turn_id: extract_turn_id(params),
        };
    }
    match norm.as_str() {
        "item/started" => {
            if is_reasoning_item(params) {
                let item_id = string_field(params, "id").unwrap_or_default();
                let summary = reasoning_summary(params);
                ProviderEvent::ReasoningUpdated { item_id, summary }
            } else if is_agent_item(params) {
                ProviderEvent::AgentItemStarted {
                    item_id: string_field(params, "id").unwrap_or_default(),
                }
            } else {
                ProviderEvent::Other(params.clone())
            }
        }
        "item/updated" => {
            if is_reasoning_item(params) {
                ProviderEvent::ReasoningUpdated {
                    item_id: string_field(params, "id").unwrap_or_default(),
                    summary: reasoning_summary(params),
                }
            } else {
                ProviderEvent::Other(params.clone())
            }
        }
        "item/agentmessage/delta" => ProviderEvent::AgentMessageDelta {
            delta: string_field(params, "delta").unwrap_or_default(),
        },
        "item/completed" => {
            if is_agent_item(params) {
                ProviderEvent::AgentItemCompleted {
                    item_id: string_field(params, "id").unwrap_or_default(),
                }
            } else {
                ProviderEvent::Other(params.clone())
            }
        }
        _ => ProviderEvent::Other(params.clone()),
    }
}

/// `isTurnCompletedEventMethod`: case-insensitive, separator-tolerant match
/// against `turn/completed`, `turn.completed`, `turn_completed`.
pub fn is_turn_completed(method: &str) -> bool {
    normalize_method(method) == "turn/completed"
}

fn normalize_method(method: &str) -> String {
    method
        .trim()
        .to_ascii_lowercase()
        .replace(['.', '_'], "/")
}

/// Probe, in order, `.turn.id`, `.turn_id`, `.turnID`, `.id`.
pub fn extract_turn_id(params: &Value) -> Option<String> {
    for key_path in [&["turn", "id"][..], &["turn_id"], &["turnID"], &["id"]] {
        if let Some(v) = dig(params, key_path) {
            if let Some(s) = v.as_str() {
                return Some(s.to_string());
            }
            if let Some(n) = v.as_i64() {
                return Some(n.to_string());
            }
        }
    }
    None
}

fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in path {
        cur = cur.as_object()?.get(*key)?;
    }
    Some(cur)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.as_object()?.get(key)?.as_str().map(|s| s.to_string())
}

fn is_agent_item(params: &Value) -> bool {
    string_field(params, "type").as_deref() == Some("agent")
        || string_field(params, "itemType").as_deref() == Some("agent")
}

fn is_reasoning_item(params: &Value) -> bool {
    string_field(params, "type").as_deref() == Some("reasoning")
        || string_field(params, "itemType").as_deref() == Some("reasoning")
}

fn reasoning_summary(params: &Value) -> String {
    match params.as_object().and_then(|o| o.get("summary")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => String::new(),
    }
}

/// An entry from the `item-stream` (tail/history), classified from its
/// `{type: ...}` shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Assistant { text: String },
    Result { text: String },
    User { text: String },
    Other(Value),
}

pub fn parse_stream_item(raw: &Value) -> StreamItem {
    match string_field(raw, "type").as_deref() {
        Some("assistant") => StreamItem::Assistant {
            text: assistant_content_text(raw),
        },
        Some("result") => StreamItem::Result {
            text: string_field(raw, "result").unwrap_or_default(),
        },
        Some("user") => StreamItem::User {
            text: assistant_content_text(raw),
        },
        _ => StreamItem::Other(raw.clone()),
    }
}

fn assistant_content_text(raw: &Value) -> String {
    match raw.as_object().and_then(|o| o.get("content")) {
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| {
                if p.as_object()?.get("type")?.as_str()? == "text" {
                    p.as_object()?.get("text")?.as_str()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn turn_completed_is_separator_tolerant() {
        for m in ["turn/completed", "turn.completed", "turn_completed", "  TURN/Completed  "] {
            assert!(is_turn_completed(m), "{m} should match");
        }
        assert!(!is_turn_completed("turn/started"));
    }

    #[test]
    fn extract_turn_id_probes_in_documented_order() {
        assert_eq!(extract_turn_id(&json!({"turn": {"id": "t1"}})).as_deref(), Some("t1"));
        assert_eq!(extract_turn_id(&json!({"turn_id": "t2"})).as_deref(), Some("t2"));
        assert_eq!(extract_turn_id(&json!({"turnID": "t3"})).as_deref(), Some("t3"));
        assert_eq!(extract_turn_id(&json!({"id": "t4"})).as_deref(), Some("t4"));
        assert_eq!(extract_turn_id(&json!({})), None);
        // turn.id takes priority over a top-level id when both present.
        assert_eq!(
            extract_turn_id(&json!({"turn": {"id": "t1"}, "id": "t4"})).as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn parses_agent_message_delta() {
        let ev = parse_provider_event("item/agentMessage/delta", &json!({"delta": "hi"}));
        assert_eq!(ev, ProviderEvent::AgentMessageDelta { delta: "hi".into() });
    }

    #[test]
    fn parses_reasoning_started_with_summary_list() {
        let ev = parse_provider_event(
            "item/started",
            &json!({"type": "reasoning", "id": "r1", "summary": ["thinking"]}),
        );
        assert_eq!(
            ev,
            ProviderEvent::ReasoningUpdated { item_id: "r1".into(), summary: "thinking".into() }
        );
    }

    #[test]
    fn parses_agent_item_started_and_completed() {
        let started = parse_provider_event("item/started", &json!({"type": "agent", "id": "a1"}));
        assert_eq!(started, ProviderEvent::AgentItemStarted { item_id: "a1".into() });
        let completed = parse_provider_event("item/completed", &json!({"type": "agent", "id": "a1"}));
        assert_eq!(completed, ProviderEvent::AgentItemCompleted { item_id: "a1".into() });
    }

    #[test]
    fn parses_turn_completed_with_dotted_method() {
        let ev = parse_provider_event("turn.completed", &json!({"turn_id": "t9"}));
        assert_eq!(ev, ProviderEvent::TurnCompleted { turn_id: Some("t9".into()) });
    }

    #[test]
    fn stream_item_classifies_assistant_result_and_user() {
        assert_eq!(
            parse_stream_item(&json!({"type": "assistant", "content": [{"type": "text", "text": "hi"}]})),
            StreamItem::Assistant { text: "hi".into() }
        );
        assert_eq!(
            parse_stream_item(&json!({"type": "result", "result": "done"})),
            StreamItem::Result { text: "done".into() }
        );
        assert_eq!(
            parse_stream_item(&json!({"type": "user", "content": "hello"})),
            StreamItem::User { text: "hello".into() }
        );
    }
}
