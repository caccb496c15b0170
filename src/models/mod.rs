//! Model Resolver (§4.1) — resolves a caller-supplied model string to the
//! upstream's internal model id via prioritized pattern rules.
//!
//! A flat table of static rule data, evaluated top-down, the same shape
//! as a provider catalogue table.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Regex,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    pub external_pattern: String,
    pub internal_id: String,
    pub match_type: MatchType,
    pub priority: i32,
    pub enabled: bool,
}

impl ModelMapping {
    fn matches(&self, input: &str) -> bool {
        match self.match_type {
            MatchType::Exact => self.external_pattern == input,
            MatchType::Regex => Regex::new(&format!("^(?:{})$", self.external_pattern))
                .map(|re| re.is_match(input))
                .unwrap_or(false),
            MatchType::Contains => input
                .to_lowercase()
                .contains(&self.external_pattern.to_lowercase()),
        }
    }
}

/// Holds an ordered snapshot of mappings. Request handlers take a snapshot
/// at entry (§9 "global mutable strategy map") rather than reading through
/// a lock per lookup.
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    mappings: Vec<ModelMapping>,
}

impl ModelResolver {
    pub fn new(mut mappings: Vec<ModelMapping>) -> Self {
        // Highest priority first; ties keep the order given in the rule set.
        mappings.sort_by_key(|m| std::cmp::Reverse(m.priority));
        Self { mappings }
    }

    /// Built-in rule set: versioned exact names beat the generic substring
    /// family buckets, which are the low-priority default (§4.1 rationale).
    pub fn default_mappings() -> Self {
        Self::new(vec![
            ModelMapping {
                external_pattern: "claude-sonnet-4-5-20250929".into(),
                internal_id: "CLAUDE_SONNET_4_5_20250929_V1_0".into(),
                match_type: MatchType::Exact,
                priority: 100,
                enabled: true,
            },
            ModelMapping {
                external_pattern: "claude-opus-4-1-20250805".into(),
                internal_id: "CLAUDE_OPUS_4_1_20250805_V1_0".into(),
                match_type: MatchType::Exact,
                priority: 100,
                enabled: true,
            },
            ModelMapping {
                external_pattern: r"claude-3-7-sonnet(-\d{8})?".into(),
                internal_id: "CLAUDE_3_7_SONNET_20250219_V1_0".into(),
                match_type: MatchType::Regex,
                priority: 50,
                enabled: true,
            },
            ModelMapping {
                external_pattern: "sonnet".into(),
                internal_id: "CLAUDE_SONNET_4_5_20250929_V1_0".into(),
                match_type: MatchType::Contains,
                priority: 10,
                enabled: true,
            },
            ModelMapping {
                external_pattern: "opus".into(),
                internal_id: "CLAUDE_OPUS_4_1_20250805_V1_0".into(),
                match_type: MatchType::Contains,
                priority: 10,
                enabled: true,
            },
            ModelMapping {
                external_pattern: "haiku".into(),
                internal_id: "CLAUDE_HAIKU_3_5_20241022_V1_0".into(),
                match_type: MatchType::Contains,
                priority: 10,
                enabled: true,
            },
        ])
    }

    /// Evaluate enabled mappings in descending priority and return the
    /// first match's internal id, or `UnsupportedModel`.
    pub fn resolve(&self, model: &str) -> Result<String, EngineError> {
        self.mappings
            .iter()
            .filter(|m| m.enabled)
            .find(|m| m.matches(model))
            .map(|m| m.internal_id.clone())
            .ok_or_else(|| EngineError::UnsupportedModel(model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_beats_contains_regardless_of_priority_order() {
        let resolver = ModelResolver::default_mappings();
        assert_eq!(
            resolver.resolve("claude-sonnet-4-5-20250929").unwrap(),
            "CLAUDE_SONNET_4_5_20250929_V1_0"
        );
    }

    #[test]
    fn substring_family_bucket_is_fallback() {
        let resolver = ModelResolver::default_mappings();
        assert_eq!(
            resolver.resolve("claude-sonnet-latest").unwrap(),
            "CLAUDE_SONNET_4_5_20250929_V1_0"
        );
    }

    #[test]
    fn regex_rule_matches_whole_string() {
        let resolver = ModelResolver::default_mappings();
        assert_eq!(
            resolver.resolve("claude-3-7-sonnet-20250219").unwrap(),
            "CLAUDE_3_7_SONNET_20250219_V1_0"
        );
    }

    #[test]
    fn unknown_model_fails() {
        let resolver = ModelResolver::default_mappings();
        let err = resolver.resolve("gpt-5").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedModel(_)));
    }

    #[test]
    fn disabled_mapping_is_skipped() {
        // Disable the regex rule, whose target ("CLAUDE_3_7_SONNET_...")
        // differs from the lower-priority "sonnet" substring fallback's
        // target — so the assertion only passes if `enabled` is honored.
        let mut mappings = ModelResolver::default_mappings().mappings;
        for m in mappings.iter_mut() {
            if m.match_type == MatchType::Regex {
                m.enabled = false;
            }
        }
        let resolver = ModelResolver::new(mappings);
        assert_eq!(
            resolver.resolve("claude-3-7-sonnet-20250219").unwrap(),
            "CLAUDE_SONNET_4_5_20250929_V1_0"
        );
    }
}
