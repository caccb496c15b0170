//! Tool definition sanitization (§4.5 "Tool definitions").
//!
//! Recursive depth-bounded rewriting of an arbitrary `serde_json::Value`
//! tree, applied here to schema sanitization.

use std::collections::HashMap;

use serde_json::{Map, Value};

const MAX_SCHEMA_DEPTH: usize = 6;
const MAX_SCHEMA_ARRAY_ITEMS: usize = 32;
const MAX_SCHEMA_OBJECT_ENTRIES: usize = 96;
const DESCRIPTION_FIELD_CAP: usize = 512;
const OTHER_STRING_CAP: usize = 1024;
const TOOL_DESCRIPTION_CAP: usize = 2000;

const DROP_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$defs",
    "definitions",
    "examples",
    "example",
    "deprecated",
    "readOnly",
    "writeOnly",
];

pub struct ForeignTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Bidirectional rename map between a foreign tool name and the sanitized
/// upstream name emitted for it (§3 ToolDefinition invariant).
#[derive(Debug, Clone, Default)]
pub struct ToolNameMap {
    original_to_sanitized: HashMap<String, String>,
}

impl ToolNameMap {
    /// Sanitized name to use for a reference to `original` (e.g. a
    /// `tool_use` block). Falls back to an ad hoc sanitize when the name
    /// was never declared in the request's `tools` list.
    pub fn sanitized_for(&self, original: &str) -> String {
        self.original_to_sanitized
            .get(original)
            .cloned()
            .unwrap_or_else(|| sanitize_name(original))
    }

    pub fn original_for(&self, sanitized: &str) -> Option<&str> {
        self.original_to_sanitized
            .iter()
            .find(|(_, v)| v.as_str() == sanitized)
            .map(|(k, _)| k.as_str())
    }
}

pub fn is_web_search(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "web_search" || lower == "web-search" || lower == "websearch" || lower.contains("web_search")
}

/// Map a foreign tool name onto `[A-Za-z0-9_]+`: non-matching runs collapse
/// to a single underscore, leading/trailing underscores are stripped, and
/// a `t_` prefix is added when the result starts with a digit.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_underscore = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            last_was_underscore = ch == '_';
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let mut result = if trimmed.is_empty() {
        "tool".to_string()
    } else {
        trimmed.to_string()
    };
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result = format!("t_{result}");
    }
    result
}

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Sanitize every foreign tool definition, dropping web-search variants,
/// and build the rename map used both for the emitted tool list and for
/// any `tool_use` references to these names found in message history.
pub fn translate_tools(tools: &[ForeignTool]) -> (Vec<ToolSpec>, ToolNameMap) {
    let mut map = ToolNameMap::default();
    let mut seen_counts: HashMap<String, u32> = HashMap::new();
    let mut specs = Vec::new();

    for tool in tools {
        if is_web_search(&tool.name) {
            continue;
        }
        let base = sanitize_name(&tool.name);
        let count = seen_counts.entry(base.clone()).or_insert(0);
        *count += 1;
        let final_name = if *count == 1 {
            base.clone()
        } else {
            format!("{base}_{count}")
        };
        map.original_to_sanitized.insert(tool.name.clone(), final_name.clone());

        specs.push(ToolSpec {
            name: final_name,
            description: truncate_chars(&tool.description, TOOL_DESCRIPTION_CAP),
            input_schema: sanitize_schema(&tool.input_schema),
        });
    }

    (specs, map)
}

pub fn sanitize_schema(value: &Value) -> Value {
    match sanitize_value(value, 0) {
        Some(Value::Object(map)) if map.is_empty() => default_schema(),
        Some(v) => v,
        None => default_schema(),
    }
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

fn sanitize_value(value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_SCHEMA_DEPTH {
        return None;
    }
    Some(match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map.iter().take(MAX_SCHEMA_OBJECT_ENTRIES) {
                if DROP_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if let Some(sanitized) = sanitize_value(v, depth + 1) {
                    let cap = if key == "description" || key == "title" {
                        DESCRIPTION_FIELD_CAP
                    } else {
                        OTHER_STRING_CAP
                    };
                    out.insert(key.clone(), truncate_string_value(sanitized, cap));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_SCHEMA_ARRAY_ITEMS)
                .filter_map(|v| sanitize_value(v, depth + 1))
                .collect(),
        ),
        Value::String(s) => Value::String(truncate_chars(s, OTHER_STRING_CAP)),
        other => other.clone(),
    })
}

fn truncate_string_value(value: Value, cap: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_chars(&s, cap)),
        other => other,
    }
}

pub fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitizes_hyphenated_name_with_digit_prefix_rule() {
        assert_eq!(sanitize_name("3d-lookup"), "t_3d_lookup");
    }

    #[test]
    fn collapses_repeated_separators_and_trims() {
        assert_eq!(sanitize_name("__read--file__"), "read_file");
    }

    #[test]
    fn web_search_tool_is_dropped() {
        let tools = vec![ForeignTool {
            name: "web_search".to_string(),
            description: "".to_string(),
            input_schema: json!({}),
        }];
        let (specs, _) = translate_tools(&tools);
        assert!(specs.is_empty());
    }

    #[test]
    fn duplicate_names_after_sanitization_get_numbered_suffixes() {
        let tools = vec![
            ForeignTool {
                name: "read file".to_string(),
                description: "".to_string(),
                input_schema: json!({}),
            },
            ForeignTool {
                name: "read-file".to_string(),
                description: "".to_string(),
                input_schema: json!({}),
            },
        ];
        let (specs, _) = translate_tools(&tools);
        assert_eq!(specs[0].name, "read_file");
        assert_eq!(specs[1].name, "read_file_2");
    }

    #[test]
    fn empty_sanitized_schema_falls_back_to_default_object() {
        let sanitized = sanitize_schema(&json!({"$schema": "http://example.com"}));
        assert_eq!(sanitized, json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn schema_beyond_depth_limit_is_dropped_not_kept() {
        let mut nested = json!("leaf");
        for _ in 0..10 {
            nested = json!({"properties": {"x": nested}});
        }
        let sanitized = sanitize_schema(&nested);
        // Depth exceeded somewhere inside; must not panic or retain the leaf verbatim.
        assert!(sanitized.is_object());
    }

    #[test]
    fn schema_arrays_are_capped() {
        let items: Vec<Value> = (0..50).map(|i| json!(i)).collect();
        let sanitized = sanitize_schema(&json!({"enum": items}));
        assert_eq!(sanitized["enum"].as_array().unwrap().len(), MAX_SCHEMA_ARRAY_ITEMS);
    }
}
