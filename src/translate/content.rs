//! Content block normalization (§4.5 "Content block normalization").
//!
//! Operates directly on `serde_json::Value` rather than a strongly typed
//! enum: the foreign content shape is attacker-controlled JSON and the
//! spec's own rule ("never trust field types from the wire", §9) means
//! every accessor here has to tolerate the field being absent or the
//! wrong type instead of failing the whole translation.

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum NormalizedBlock {
    Text(String),
    Thinking(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        text: String,
    },
}

/// Normalize one message's `content` field, which may be a bare string, a
/// bare number, or an array of typed blocks.
pub fn normalize_content(content: &Value) -> Vec<NormalizedBlock> {
    match content {
        Value::String(s) => vec![NormalizedBlock::Text(s.clone())],
        Value::Number(n) => vec![NormalizedBlock::Text(n.to_string())],
        Value::Array(items) => items.iter().filter_map(normalize_block).collect(),
        _ => Vec::new(),
    }
}

fn normalize_block(item: &Value) -> Option<NormalizedBlock> {
    match item {
        Value::String(s) => Some(NormalizedBlock::Text(s.clone())),
        Value::Number(n) => Some(NormalizedBlock::Text(n.to_string())),
        Value::Object(_) => {
            let block_type = item.get("type").and_then(Value::as_str).unwrap_or("");
            match block_type {
                "text" => Some(NormalizedBlock::Text(
                    item.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
                )),
                "thinking" => Some(NormalizedBlock::Thinking(
                    item.get("thinking")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                )),
                "redacted_thinking" => None,
                "tool_use" => Some(NormalizedBlock::ToolUse {
                    id: item
                        .get("id")
                        .or_else(|| item.get("tool_use_id"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    name: item.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                    input: normalize_tool_input(item.get("input")),
                }),
                "tool_result" => Some(NormalizedBlock::ToolResult {
                    tool_use_id: item
                        .get("tool_use_id")
                        .or_else(|| item.get("toolUseId"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    is_error: item.get("is_error").and_then(Value::as_bool).unwrap_or(false),
                    text: normalize_tool_result_text(item.get("content")),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

fn normalize_tool_input(input: Option<&Value>) -> Value {
    match input {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({})),
        Some(Value::Null) | None => serde_json::json!({}),
        Some(other) => other.clone(),
    }
}

/// `tool_result.content` may be a bare string, an array of text-ish blocks,
/// or absent. Always collapses to one joined string; empty becomes `"OK"`.
fn normalize_tool_result_text(content: Option<&Value>) -> String {
    let text = match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => item.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        "OK".to_string()
    } else {
        text
    }
}
