//! End-to-end request-translation scenarios through the public API, one
//! per testable property named for the request translator.

use relayq::translate::{self, ForeignRequest, RawMessage, RawTool, ThinkingConfig};
use serde_json::json;

fn request(messages: Vec<RawMessage>) -> ForeignRequest {
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
fn pure_text_conversation_has_no_tool_context() {
    let req = request(vec![RawMessage {
        role: "user".to_string(),
        content: json!("what's the weather like"),
    }]);
    let (body, _) = translate::translate_request(&req, "CLAUDE_SONNET_4_5_20250929_V1_0", None).unwrap();
    let state = &body["conversationState"];
    assert_eq!(state["currentMessage"]["userInputMessage"]["content"], "what's the weather like");
    assert!(state["currentMessage"]["userInputMessage"]["userInputMessageContext"].is_null());
}

#[test]
fn system_prompt_becomes_leading_history_pair() {
    let mut req = request(vec![RawMessage {
        role: "user".to_string(),
        content: json!("hi"),
    }]);
    req.system = Some(json!("You are a careful assistant."));
    let (body, _) = translate::translate_request(&req, "m", None).unwrap();
    let history = body["conversationState"]["history"].as_array().unwrap();
    assert_eq!(history[0]["userInputMessage"]["content"], "You are a careful assistant.");
    assert_eq!(history[1]["assistantResponseMessage"]["content"], "I will follow these instructions.");
}

#[test]
fn thinking_and_system_combine_into_one_leading_turn() {
    let mut req = request(vec![RawMessage {
        role: "user".to_string(),
        content: json!("hi"),
    }]);
    req.system = Some(json!("Be terse."));
    req.thinking = Some(ThinkingConfig {
        kind: "enabled".to_string(),
        budget_tokens: Some(4096),
    });
    let (body, _) = translate::translate_request(&req, "m", None).unwrap();
    let history = body["conversationState"]["history"].as_array().unwrap();
    let leading = history[0]["userInputMessage"]["content"].as_str().unwrap();
    assert!(leading.starts_with("<thinking_mode>enabled</thinking_mode><max_thinking_length>4096</max_thinking_length>"));
    assert!(leading.ends_with("Be terse."));
}

#[test]
fn declared_tool_round_trips_through_sanitized_name() {
    let mut req = request(vec![
        RawMessage {
            role: "user".to_string(),
            content: json!("look something up"),
        },
        RawMessage {
            role: "assistant".to_string(),
            content: json!([{"type": "tool_use", "id": "tu_42", "name": "3d-lookup", "input": {"query": "x"}}]),
        },
        RawMessage {
            role: "user".to_string(),
            content: json!([{"type": "tool_result", "tool_use_id": "tu_42", "content": "found it"}]),
        },
    ]);
    req.tools = Some(vec![RawTool {
        name: "3d-lookup".to_string(),
        description: "looks things up in 3D space".to_string(),
        input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
    }]);

    let (body, names) = translate::translate_request(&req, "m", None).unwrap();
    let history = body["conversationState"]["history"].as_array().unwrap();
    let tool_uses = history
        .iter()
        .find_map(|entry| entry.get("assistantResponseMessage").and_then(|m| m.get("toolUses")))
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(tool_uses[0]["name"], "t_3d_lookup");
    assert_eq!(names.original_for("t_3d_lookup"), Some("3d-lookup"));

    let tools = body["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"]["tools"]
        .as_array()
        .unwrap();
    assert_eq!(tools[0]["toolSpecification"]["name"], "t_3d_lookup");
}

#[test]
fn web_search_tool_never_reaches_upstream() {
    let mut req = request(vec![RawMessage {
        role: "user".to_string(),
        content: json!("search the web"),
    }]);
    req.tools = Some(vec![RawTool {
        name: "web_search".to_string(),
        description: "".to_string(),
        input_schema: json!({}),
    }]);
    let (body, _) = translate::translate_request(&req, "m", None).unwrap();
    let context = &body["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"];
    assert!(context.is_null());
}
