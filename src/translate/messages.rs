//! Message normalization: current-turn detection, history merge/alternation
//! (§4.5 "Message normalization rules").

use serde_json::Value;

use super::content::{normalize_content, NormalizedBlock};
use super::tools::{truncate_chars, ToolNameMap};

const MAX_MESSAGES: usize = 200;
const MAX_TOOL_USE_ID_LEN: usize = 128;

pub struct ForeignMessage {
    pub role: String,
    pub content: Value,
}

pub struct ToolResultEntry {
    pub tool_use_id: String,
    pub status: &'static str,
    pub text: String,
}

pub struct ToolUseEntry {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

pub struct AssistantEntry {
    pub content: String,
    pub tool_uses: Vec<ToolUseEntry>,
}

pub struct UserEntry {
    pub content: String,
    pub tool_results: Vec<ToolResultEntry>,
}

pub enum HistoryItem {
    User(UserEntry),
    Assistant(AssistantEntry),
}

pub struct NormalizedConversation {
    pub history: Vec<HistoryItem>,
    pub current_text: String,
    pub current_tool_results: Vec<ToolResultEntry>,
}

pub fn normalize_messages(messages: &[ForeignMessage], tool_names: &ToolNameMap) -> NormalizedConversation {
    let filtered: Vec<&ForeignMessage> = messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .collect();
    let kept: Vec<&ForeignMessage> = if filtered.len() > MAX_MESSAGES {
        filtered[filtered.len() - MAX_MESSAGES..].to_vec()
    } else {
        filtered
    };

    if kept.is_empty() {
        return NormalizedConversation {
            history: Vec::new(),
            current_text: "continue".to_string(),
            current_tool_results: Vec::new(),
        };
    }

    let last_is_assistant = kept.last().unwrap().role == "assistant";
    let (history_slice, current_slice): (&[&ForeignMessage], &[&ForeignMessage]) = if last_is_assistant {
        (&kept[..], &[])
    } else {
        let mut start = kept.len();
        while start > 0 && kept[start - 1].role == "user" {
            start -= 1;
        }
        (&kept[..start], &kept[start..])
    };

    let mut current_text_parts = Vec::new();
    let mut current_tool_results = Vec::new();
    for msg in current_slice {
        for block in normalize_content(&msg.content) {
            match block {
                NormalizedBlock::Text(t) if !t.is_empty() => {
                    current_text_parts.push(t);
                }
                NormalizedBlock::ToolResult {
                    tool_use_id,
                    is_error,
                    text,
                } => current_tool_results.push(ToolResultEntry {
                    tool_use_id,
                    status: status_for(is_error),
                    text,
                }),
                _ => {}
            }
        }
    }
    let current_text = if current_text_parts.is_empty() {
        "continue".to_string()
    } else {
        current_text_parts.join("\n")
    };

    let mut history: Vec<HistoryItem> = Vec::new();
    let mut i = 0;
    while i < history_slice.len() {
        if history_slice[i].role == "user" {
            let mut texts = Vec::new();
            let mut tool_results = Vec::new();
            while i < history_slice.len() && history_slice[i].role == "user" {
                for block in normalize_content(&history_slice[i].content) {
                    match block {
                        NormalizedBlock::Text(t) if !t.is_empty() => {
                            texts.push(t);
                        }
                        NormalizedBlock::ToolResult {
                            tool_use_id,
                            is_error,
                            text,
                        } => tool_results.push(ToolResultEntry {
                            tool_use_id,
                            status: status_for(is_error),
                            text,
                        }),
                        _ => {}
                    }
                }
                i += 1;
            }
            history.push(HistoryItem::User(UserEntry {
                content: texts.join("\n"),
                tool_results,
            }));
        } else {
            let mut thinking_parts = Vec::new();
            let mut texts = Vec::new();
            let mut tool_uses = Vec::new();
            for block in normalize_content(&history_slice[i].content) {
                match block {
                    NormalizedBlock::Text(t) if !t.is_empty() => {
                        texts.push(t);
                    }
                    NormalizedBlock::Thinking(t) if !t.is_empty() => {
                        thinking_parts.push(t);
                    }
                    NormalizedBlock::ToolUse { id, name, input } => tool_uses.push(ToolUseEntry {
                        tool_use_id: sanitize_tool_use_id(&id),
                        name: tool_names.sanitized_for(&name),
                        input,
                    }),
                    _ => {}
                }
            }
            let mut content = texts.join("\n");
            if !thinking_parts.is_empty() {
                content = format!("<thinking>{}</thinking>{}", thinking_parts.join("\n"), content);
            }
            history.push(HistoryItem::Assistant(AssistantEntry { content, tool_uses }));
            i += 1;
        }
    }

    if matches!(history.last(), Some(HistoryItem::User(_))) {
        history.push(HistoryItem::Assistant(AssistantEntry {
            content: "OK".to_string(),
            tool_uses: Vec::new(),
        }));
    }

    NormalizedConversation {
        history,
        current_text,
        current_tool_results,
    }
}

fn status_for(is_error: bool) -> &'static str {
    if is_error {
        "error"
    } else {
        "success"
    }
}

fn sanitize_tool_use_id(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
        .collect();
    truncate_chars(&filtered, MAX_TOOL_USE_ID_LEN)
}
