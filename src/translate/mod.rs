//! Request Translator (§4.5) — converts the foreign `messages + tools +
//! system + thinking` schema into the upstream `conversationState` wire
//! schema. Pure and deterministic given fresh UUIDs.
//!
//! The wire shape is modeled as plain structs rather than a generic
//! `serde_json::Value` tree specifically so field order is guaranteed by
//! derive order, not by an ordered-map feature flag — the upstream parser
//! is documented as order-sensitive (§3).

pub mod content;
pub mod messages;
pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use tools::ToolNameMap;

use crate::error::EngineError;
use content::NormalizedBlock;
use messages::{ForeignMessage, HistoryItem, ToolResultEntry, ToolUseEntry};
use tools::ForeignTool;

/// Fixed per the upstream contract; not otherwise documented by the source.
const ORIGIN: &str = "AI_EDITOR";
const DEFAULT_THINKING_BUDGET: u32 = 10_000;
const CURRENT_MESSAGE_CONTENT_CAP: usize = 12_000;

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Deserialize)]
pub struct RawTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema_value")]
    pub input_schema: Value,
}

fn default_schema_value() -> Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub budget_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ForeignRequest {
    pub model: String,
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub system: Option<Value>,
    #[serde(default)]
    pub tools: Option<Vec<RawTool>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
}

// ---- Upstream wire shape --------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ConversationRequestWire {
    #[serde(rename = "conversationState")]
    pub conversation_state: ConversationState,
    #[serde(rename = "profileArn", skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationState {
    #[serde(rename = "agentContinuationId")]
    pub agent_continuation_id: String,
    #[serde(rename = "agentTaskType")]
    pub agent_task_type: String,
    #[serde(rename = "chatTriggerType")]
    pub chat_trigger_type: String,
    #[serde(rename = "currentMessage")]
    pub current_message: CurrentMessage,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct CurrentMessage {
    #[serde(rename = "userInputMessage")]
    pub user_input_message: UserInputMessage,
}

#[derive(Debug, Serialize)]
pub struct UserInputMessage {
    pub content: String,
    #[serde(rename = "modelId")]
    pub model_id: String,
    pub origin: String,
    #[serde(rename = "userInputMessageContext", skip_serializing_if = "Option::is_none")]
    pub user_input_message_context: Option<UserInputMessageContext>,
}

#[derive(Debug, Serialize)]
pub struct UserInputMessageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpecWrapper>>,
    #[serde(rename = "toolResults", skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResultWire>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    User {
        #[serde(rename = "userInputMessage")]
        user_input_message: UserInputMessage,
    },
    Assistant {
        #[serde(rename = "assistantResponseMessage")]
        assistant_response_message: AssistantResponseMessage,
    },
}

#[derive(Debug, Serialize)]
pub struct AssistantResponseMessage {
    pub content: String,
    #[serde(rename = "toolUses", skip_serializing_if = "Option::is_none")]
    pub tool_uses: Option<Vec<ToolUseWire>>,
}

#[derive(Debug, Serialize)]
pub struct ToolUseWire {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

impl From<ToolUseEntry> for ToolUseWire {
    fn from(entry: ToolUseEntry) -> Self {
        Self {
            tool_use_id: entry.tool_use_id,
            name: entry.name,
            input: entry.input,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolResultWire {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    pub status: String,
    pub content: Vec<ToolResultContent>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    pub text: String,
}

impl From<ToolResultEntry> for ToolResultWire {
    fn from(entry: ToolResultEntry) -> Self {
        Self {
            tool_use_id: entry.tool_use_id,
            status: entry.status.to_string(),
            content: vec![ToolResultContent { text: entry.text }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolSpecWrapper {
    #[serde(rename = "toolSpecification")]
    pub tool_specification: ToolSpecification,
}

#[derive(Debug, Serialize)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchemaWrapper,
}

#[derive(Debug, Serialize)]
pub struct InputSchemaWrapper {
    pub json: Value,
}

impl From<tools::ToolSpec> for ToolSpecWrapper {
    fn from(spec: tools::ToolSpec) -> Self {
        Self {
            tool_specification: ToolSpecification {
                name: spec.name,
                description: spec.description,
                input_schema: InputSchemaWrapper { json: spec.input_schema },
            },
        }
    }
}

/// Translate a foreign request into the upstream wire body.
///
/// Returns the serialized `conversationState` envelope plus the bidirectional
/// tool rename map (§3 ToolDefinition), needed by the caller to map returned
/// `toolUseId`s back to the tool names the client originally sent.
pub fn translate_request(
    req: &ForeignRequest,
    internal_model_id: &str,
    profile_arn: Option<&str>,
) -> Result<(Value, ToolNameMap), EngineError> {
    let relevant_count = req
        .messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .count();
    if relevant_count == 0 {
        return Err(EngineError::EmptyMessages);
    }

    let foreign_messages: Vec<ForeignMessage> = req
        .messages
        .iter()
        .map(|m| ForeignMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let foreign_tools: Vec<ForeignTool> = req
        .tools
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|t| ForeignTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect();

    let (tool_specs, tool_name_map) = tools::translate_tools(&foreign_tools);
    let normalized = messages::normalize_messages(&foreign_messages, &tool_name_map);

    let mut history_wire = Vec::new();
    push_system_turn(&mut history_wire, req, internal_model_id);

    for item in normalized.history {
        match item {
            HistoryItem::User(entry) => {
                let context = (!entry.tool_results.is_empty()).then(|| UserInputMessageContext {
                    tools: None,
                    tool_results: Some(entry.tool_results.into_iter().map(ToolResultWire::from).collect()),
                });
                history_wire.push(HistoryEntry::User {
                    user_input_message: UserInputMessage {
                        content: entry.content,
                        model_id: internal_model_id.to_string(),
                        origin: ORIGIN.to_string(),
                        user_input_message_context: context,
                    },
                });
            }
            HistoryItem::Assistant(entry) => {
                let tool_uses = (!entry.tool_uses.is_empty())
                    .then(|| entry.tool_uses.into_iter().map(ToolUseWire::from).collect());
                history_wire.push(HistoryEntry::Assistant {
                    assistant_response_message: AssistantResponseMessage {
                        content: entry.content,
                        tool_uses,
                    },
                });
            }
        }
    }

    let current_text = tools::truncate_chars(&normalized.current_text, CURRENT_MESSAGE_CONTENT_CAP);

    let chat_trigger_type = if !tool_specs.is_empty()
        && matches!(
            req.tool_choice.as_ref().map(|c| c.kind.as_str()),
            Some("any") | Some("tool")
        ) {
        "AUTO"
    } else {
        "MANUAL"
    };

    let tools_wire = (!tool_specs.is_empty()).then(|| tool_specs.into_iter().map(ToolSpecWrapper::from).collect());
    let tool_results_wire = (!normalized.current_tool_results.is_empty())
        .then(|| normalized.current_tool_results.into_iter().map(ToolResultWire::from).collect());

    let context = if tools_wire.is_none() && tool_results_wire.is_none() {
        None
    } else {
        Some(UserInputMessageContext {
            tools: tools_wire,
            tool_results: tool_results_wire,
        })
    };

    let conversation_state = ConversationState {
        agent_continuation_id: Uuid::new_v4().to_string(),
        agent_task_type: "vibe".to_string(),
        chat_trigger_type: chat_trigger_type.to_string(),
        current_message: CurrentMessage {
            user_input_message: UserInputMessage {
                content: current_text,
                model_id: internal_model_id.to_string(),
                origin: ORIGIN.to_string(),
                user_input_message_context: context,
            },
        },
        conversation_id: Uuid::new_v4().to_string(),
        history: history_wire,
    };

    let envelope = ConversationRequestWire {
        conversation_state,
        profile_arn: profile_arn.map(str::to_string),
    };

    let value = serde_json::to_value(&envelope)
        .map_err(|e| EngineError::Configuration(format!("failed to serialize translated request: {e}")))?;

    Ok((value, tool_name_map))
}

fn push_system_turn(history_wire: &mut Vec<HistoryEntry>, req: &ForeignRequest, internal_model_id: &str) {
    let thinking_enabled = req.thinking.as_ref().is_some_and(|t| t.kind == "enabled");
    let budget = req
        .thinking
        .as_ref()
        .and_then(|t| t.budget_tokens)
        .unwrap_or(DEFAULT_THINKING_BUDGET);
    let system_text = extract_system_text(req.system.as_ref());

    let turn_content = match (system_text, thinking_enabled) {
        (Some(text), true) => Some(format!("{}{}", thinking_prefix(budget), text)),
        (Some(text), false) => Some(text),
        (None, true) => Some(thinking_prefix(budget)),
        (None, false) => None,
    };

    if let Some(content) = turn_content {
        history_wire.push(HistoryEntry::User {
            user_input_message: UserInputMessage {
                content,
                model_id: internal_model_id.to_string(),
                origin: ORIGIN.to_string(),
                user_input_message_context: None,
            },
        });
        history_wire.push(HistoryEntry::Assistant {
            assistant_response_message: AssistantResponseMessage {
                content: "I will follow these instructions.".to_string(),
                tool_uses: None,
            },
        });
    }
}

fn thinking_prefix(budget: u32) -> String {
    format!("<thinking_mode>enabled</thinking_mode><max_thinking_length>{budget}</max_thinking_length>")
}

fn extract_system_text(system: Option<&Value>) -> Option<String> {
    let value = system?;
    let text: String = content::normalize_content(value)
        .into_iter()
        .filter_map(|b| match b {
            NormalizedBlock::Text(t) => Some(t),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_request(messages: Vec<RawMessage>) -> ForeignRequest {
        ForeignRequest {
            model: "claude-sonnet-4.5".to_string(),
            messages,
            system: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }

    #[test]
    fn pure_text_no_tools() {
        let req = base_request(vec![RawMessage {
            role: "user".to_string(),
            content: json!("hi"),
        }]);
        let (value, _) = translate_request(&req, "CLAUDE_SONNET_4_5_20250929_V1_0", None).unwrap();
        let state = &value["conversationState"];
        assert_eq!(state["chatTriggerType"], "MANUAL");
        assert_eq!(state["currentMessage"]["userInputMessage"]["content"], "hi");
        assert!(state["currentMessage"]["userInputMessage"]["userInputMessageContext"].is_null());
        assert_eq!(state["history"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn thinking_enabled_without_system_produces_directive_pair() {
        let mut req = base_request(vec![RawMessage {
            role: "user".to_string(),
            content: json!("hi"),
        }]);
        req.thinking = Some(ThinkingConfig {
            kind: "enabled".to_string(),
            budget_tokens: Some(2048),
        });
        let (value, _) = translate_request(&req, "m", None).unwrap();
        let history = value["conversationState"]["history"].as_array().unwrap();
        assert_eq!(
            history[0]["userInputMessage"]["content"],
            "<thinking_mode>enabled</thinking_mode><max_thinking_length>2048</max_thinking_length>"
        );
        assert_eq!(
            history[1]["assistantResponseMessage"]["content"],
            "I will follow these instructions."
        );
    }

    #[test]
    fn tool_call_round_trip() {
        let mut req = base_request(vec![
            RawMessage {
                role: "assistant".to_string(),
                content: json!([{"type": "tool_use", "id": "tu_1", "name": "read-file", "input": {"path": "/a"}}]),
            },
            RawMessage {
                role: "user".to_string(),
                content: json!([{"type": "tool_result", "tool_use_id": "tu_1", "content": "hello"}]),
            },
        ]);
        req.tools = Some(vec![RawTool {
            name: "read-file".to_string(),
            description: "reads a file".to_string(),
            input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        }]);
        let (value, names) = translate_request(&req, "m", None).unwrap();
        let history = value["conversationState"]["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        let tool_uses = history[0]["assistantResponseMessage"]["toolUses"].as_array().unwrap();
        assert_eq!(tool_uses[0]["toolUseId"], "tu_1");
        assert_eq!(tool_uses[0]["name"], "read_file");
        assert_eq!(tool_uses[0]["input"]["path"], "/a");

        let context = &value["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"];
        let results = context["toolResults"].as_array().unwrap();
        assert_eq!(results[0]["toolUseId"], "tu_1");
        assert_eq!(results[0]["status"], "success");
        assert_eq!(results[0]["content"][0]["text"], "hello");
        assert_eq!(names.original_for("read_file"), Some("read-file"));
    }

    #[test]
    fn empty_messages_is_rejected() {
        let req = base_request(vec![]);
        assert!(matches!(
            translate_request(&req, "m", None).unwrap_err(),
            EngineError::EmptyMessages
        ));
    }

    #[test]
    fn conversation_state_field_order_matches_upstream_contract() {
        let req = base_request(vec![RawMessage {
            role: "user".to_string(),
            content: json!("hi"),
        }]);
        let (value, _) = translate_request(&req, "m", None).unwrap();
        let serialized = serde_json::to_string(&value["conversationState"]).unwrap();
        let keys = ["agentContinuationId", "agentTaskType", "chatTriggerType", "currentMessage", "conversationId", "history"];
        let positions: Vec<usize> = keys.iter().map(|k| serialized.find(&format!("\"{k}\"")).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
