//! Degradation Retry Engine (§4.6) — wraps an upstream call with an ordered
//! list of progressively more aggressive request rewrites, retried only
//! when the upstream reports an "improperly formed request" class error.
//!
//! A closure-driven attempt loop plus a set of dedicated body-shrinking
//! transforms, generalized here to a named, ordered list chosen by
//! `compatMode`.

use std::future::Future;

use serde_json::{Map, Value};

use crate::config::CompatMode;
use crate::error::EngineError;

const MAX_SUMMARY_DEPTH: usize = 6;
const COMPACT_TOOLS_CAP: usize = 24;
const COMPACT_DESCRIPTION_CAP: usize = 256;
const TRIM_HISTORY_CAP: usize = 24;
const MINIMAL_HISTORY_CAP: usize = 8;

const REJECTION_MARKERS: &[&str] = &["improperly formed request", "malformed", "invalid_request_error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    Primary,
    CompactTools,
    NoTools,
    TrimHistory,
    MinimalHistory,
    SingleTurn,
}

fn modes_for(compat_mode: CompatMode) -> &'static [FallbackMode] {
    use FallbackMode::*;
    match compat_mode {
        CompatMode::Strict => &[Primary, CompactTools],
        CompatMode::Balanced => &[Primary, CompactTools, NoTools, TrimHistory],
        CompatMode::Relaxed => &[Primary, CompactTools, NoTools, TrimHistory, MinimalHistory, SingleTurn],
    }
}

/// Whether the upstream's response should trigger the next fallback
/// transform rather than being surfaced immediately (§4.6 trigger rule).
pub fn is_retryable_rejection(status: u16, body: &str) -> bool {
    if status != 400 {
        return false;
    }
    let lower = body.to_lowercase();
    REJECTION_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub enum AttemptError {
    /// HTTP 400 matching the "improperly formed" class — try the next mode.
    Retryable,
    /// Anything else — surface immediately, no further transforms.
    Fatal(EngineError),
}

/// Attempt `body` through each fallback mode for `compat_mode` in order,
/// calling `call` for each rewritten body. Stops at the first success or
/// the first non-retryable failure; on exhausting the list, returns
/// `UpstreamRejected` with a redacted summary of the last attempted body.
pub async fn call_with_fallback<T, F, Fut>(
    compat_mode: CompatMode,
    body: Value,
    mut call: F,
) -> Result<T, EngineError>
where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let modes = modes_for(compat_mode);
    let mut last_attempt_summary = String::new();

    for (idx, mode) in modes.iter().enumerate() {
        let attempt_body = apply_transform(*mode, &body);
        match call(attempt_body.clone()).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Retryable) => {
                last_attempt_summary = summarize(&attempt_body);
                if idx + 1 == modes.len() {
                    return Err(EngineError::UpstreamRejected {
                        summary: last_attempt_summary,
                    });
                }
            }
        }
    }

    Err(EngineError::UpstreamRejected {
        summary: last_attempt_summary,
    })
}

fn apply_transform(mode: FallbackMode, body: &Value) -> Value {
    let mut body = body.clone();
    match mode {
        FallbackMode::Primary => {}
        FallbackMode::CompactTools => compact_tools(&mut body),
        FallbackMode::NoTools => drop_tools(&mut body),
        FallbackMode::TrimHistory => trim_history(&mut body),
        FallbackMode::MinimalHistory => minimal_history(&mut body),
        FallbackMode::SingleTurn => single_turn(&mut body),
    }
    body
}

fn tools_array_mut(body: &mut Value) -> Option<&mut Vec<Value>> {
    body["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"]["tools"]
        .as_array_mut()
}

fn compact_tools(body: &mut Value) {
    if let Some(tools) = tools_array_mut(body) {
        tools.truncate(COMPACT_TOOLS_CAP);
        for tool in tools.iter_mut() {
            if let Some(spec) = tool.get_mut("toolSpecification") {
                spec["inputSchema"]["json"] = serde_json::json!({"type": "object", "properties": {}});
                if let Some(desc) = spec.get("description").and_then(Value::as_str) {
                    let truncated: String = desc.chars().take(COMPACT_DESCRIPTION_CAP).collect();
                    spec["description"] = Value::String(truncated);
                }
            }
        }
    }
}

fn drop_tools(body: &mut Value) {
    if let Some(context) = body["conversationState"]["currentMessage"]["userInputMessage"]
        ["userInputMessageContext"]
        .as_object_mut()
    {
        context.remove("tools");
    }
    body["conversationState"]["chatTriggerType"] = Value::String("MANUAL".to_string());
    if let Some(history) = body["conversationState"]["history"].as_array_mut() {
        for entry in history.iter_mut() {
            if let Some(context) = entry
                .get_mut("userInputMessage")
                .and_then(|m| m.get_mut("userInputMessageContext"))
                .and_then(Value::as_object_mut)
            {
                context.remove("tools");
            }
        }
    }
}

fn trim_history(body: &mut Value) {
    drop_tools(body);
    if let Some(history) = body["conversationState"]["history"].as_array_mut() {
        for entry in history.iter_mut() {
            if let Some(assistant) = entry.get_mut("assistantResponseMessage").and_then(Value::as_object_mut) {
                assistant.remove("toolUses");
            }
        }
        if history.len() > TRIM_HISTORY_CAP {
            let keep_from = history.len() - TRIM_HISTORY_CAP;
            history.drain(0..keep_from);
        }
    }
}

fn minimal_history(body: &mut Value) {
    drop_tools(body);
    if let Some(history) = body["conversationState"]["history"].as_array_mut() {
        for entry in history.iter_mut() {
            if let Some(context) = entry
                .get_mut("userInputMessage")
                .and_then(|m| m.get_mut("userInputMessageContext"))
                .and_then(Value::as_object_mut)
            {
                context.remove("toolResults");
            }
        }
        if history.len() > MINIMAL_HISTORY_CAP {
            let keep_from = history.len() - MINIMAL_HISTORY_CAP;
            history.drain(0..keep_from);
        }
    }
}

fn single_turn(body: &mut Value) {
    let mut latest_text = "continue".to_string();
    if let Some(history) = body["conversationState"]["history"].as_array() {
        for entry in history {
            if let Some(content) = entry
                .get("userInputMessage")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                if content != "continue" && !content.is_empty() {
                    latest_text = content.to_string();
                }
            }
        }
    }

    let current = body["conversationState"]["currentMessage"]["userInputMessage"].clone();
    let model_id = current.get("modelId").cloned().unwrap_or(Value::String(String::new()));
    let origin = current.get("origin").cloned().unwrap_or(Value::String(String::new()));

    body["conversationState"]["history"] = Value::Array(Vec::new());
    body["conversationState"]["currentMessage"] = serde_json::json!({
        "userInputMessage": {
            "content": latest_text,
            "modelId": model_id,
            "origin": origin,
        }
    });
    body["conversationState"]["chatTriggerType"] = Value::String("MANUAL".to_string());
}

/// Depth-limited redacted summary of a request body for error reporting
/// (§4.6): strings become a length marker, arrays a length + 3-item sample,
/// objects a key list plus recursive summary — never the actual content.
fn summarize(body: &Value) -> String {
    serde_json::to_string(&redact(body, 0)).unwrap_or_default()
}

fn redact(value: &Value, depth: usize) -> Value {
    if depth > MAX_SUMMARY_DEPTH {
        return Value::String("<depth-limit>".to_string());
    }
    match value {
        Value::String(s) => Value::String(format!("<string len={}>", s.chars().count())),
        Value::Array(items) => {
            let sample: Vec<Value> = items.iter().take(3).map(|v| redact(v, depth + 1)).collect();
            serde_json::json!({"length": items.len(), "sample": sample})
        }
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            let mut fields = Map::new();
            for (k, v) in map {
                fields.insert(k.clone(), redact(v, depth + 1));
            }
            serde_json::json!({"keys": keys, "fields": fields})
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Value {
        serde_json::json!({
            "conversationState": {
                "agentContinuationId": "c1",
                "agentTaskType": "vibe",
                "chatTriggerType": "AUTO",
                "currentMessage": {
                    "userInputMessage": {
                        "content": "hi",
                        "modelId": "m",
                        "origin": "AI_EDITOR",
                        "userInputMessageContext": {
                            "tools": [
                                {"toolSpecification": {"name": "x", "description": "d".repeat(300), "inputSchema": {"json": {"type": "object", "properties": {"a": {}}}}}}
                            ]
                        }
                    }
                },
                "conversationId": "conv1",
                "history": []
            }
        })
    }

    #[test]
    fn compact_tools_shrinks_schema_and_description() {
        let mut body = sample_body();
        compact_tools(&mut body);
        let tools = tools_array_mut(&mut body).unwrap();
        let spec = &tools[0]["toolSpecification"];
        assert_eq!(spec["inputSchema"]["json"], serde_json::json!({"type": "object", "properties": {}}));
        assert_eq!(spec["description"].as_str().unwrap().chars().count(), COMPACT_DESCRIPTION_CAP);
    }

    #[test]
    fn no_tools_clears_context_and_forces_manual() {
        let mut body = sample_body();
        drop_tools(&mut body);
        assert_eq!(body["conversationState"]["chatTriggerType"], "MANUAL");
        assert!(body["conversationState"]["currentMessage"]["userInputMessage"]["userInputMessageContext"]
            .get("tools")
            .is_none());
    }

    #[test]
    fn retryable_rejection_requires_400_and_marker_text() {
        assert!(is_retryable_rejection(400, "Improperly Formed Request"));
        assert!(is_retryable_rejection(400, "this is MALFORMED input"));
        assert!(!is_retryable_rejection(400, "completely unrelated error"));
        assert!(!is_retryable_rejection(500, "malformed"));
    }

    #[test]
    fn transform_application_is_idempotent() {
        let body = sample_body();
        let once = apply_transform(FallbackMode::CompactTools, &body);
        let twice = apply_transform(FallbackMode::CompactTools, &once);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn exhausting_strict_mode_surfaces_upstream_rejected() {
        let body = sample_body();
        let result = call_with_fallback(CompatMode::Strict, body, |_attempt| async {
            Err::<(), _>(AttemptError::Retryable)
        })
        .await;
        assert!(matches!(result, Err(EngineError::UpstreamRejected { .. })));
    }
}
