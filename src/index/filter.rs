use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Three-clause boolean filter over payload fields: every `must` clause
/// has to match, no `must_not` clause may match, and at least one
/// `should` clause when any are present. The serde shape doubles as
/// Qdrant's wire filter, so this struct serializes straight into a
/// search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<FieldCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<FieldCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<FieldCondition>,
}

/// One clause: a payload key matched against a substring or an exact
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(rename = "match")]
    pub predicate: MatchPredicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPredicate {
    /// Substring match.
    #[serde(rename = "text")]
    Text(String),
    /// Exact-value match.
    #[serde(rename = "value")]
    Value(String),
}

impl FieldCondition {
    pub fn text(key: &str, needle: &str) -> Self {
        Self {
            key: key.to_string(),
            predicate: MatchPredicate::Text(needle.to_string()),
        }
    }

    pub fn value(key: &str, expected: &str) -> Self {
        Self {
            key: key.to_string(),
            predicate: MatchPredicate::Value(expected.to_string()),
        }
    }

    /// A clause on a key the payload lacks never matches.
    pub fn matches(&self, payload: &BTreeMap<String, String>) -> bool {
        let Some(field) = payload.get(&self.key) else {
            return false;
        };

        match &self.predicate {
            MatchPredicate::Text(needle) => field.contains(needle.as_str()),
            MatchPredicate::Value(expected) => field == expected,
        }
    }
}

impl StructuralFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required substring clause.
    pub fn require_text(mut self, key: &str, needle: &str) -> Self {
        self.must.push(FieldCondition::text(key, needle));
        self
    }

    /// Adds a forbidden substring clause.
    pub fn exclude_text(mut self, key: &str, needle: &str) -> Self {
        self.must_not.push(FieldCondition::text(key, needle));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }

    /// Local evaluation, used by the memory backend.
    pub fn matches(&self, payload: &BTreeMap<String, String>) -> bool {
        if !self.must.iter().all(|c| c.matches(payload)) {
            return false;
        }

        if self.must_not.iter().any(|c| c.matches(payload)) {
            return false;
        }

        if !self.should.is_empty() && !self.should.iter().any(|c| c.matches(payload)) {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(body: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("search_text".to_string(), body.to_string());
        map.insert("name".to_string(), "Oats".to_string());
        map
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = StructuralFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&payload("anything")));
    }

    #[test]
    fn test_must_requires_all_clauses() {
        let filter = StructuralFilter::new()
            .require_text("search_text", "breakfast")
            .require_text("search_text", "vegan");

        assert!(filter.matches(&payload("oat|milk breakfast vegan")));
        assert!(!filter.matches(&payload("oat|milk breakfast")));
    }

    #[test]
    fn test_must_not_rejects_any_match() {
        let filter = StructuralFilter::new().exclude_text("search_text", "butter");

        assert!(filter.matches(&payload("oat|milk")));
        assert!(!filter.matches(&payload("chicken|butter")));
    }

    #[test]
    fn test_should_needs_at_least_one() {
        let mut filter = StructuralFilter::new();
        filter.should.push(FieldCondition::text("search_text", "vegan"));
        filter.should.push(FieldCondition::text("search_text", "dessert"));

        assert!(filter.matches(&payload("vegan bowl")));
        assert!(filter.matches(&payload("dessert plate")));
        assert!(!filter.matches(&payload("chicken dinner")));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let must = StructuralFilter::new().require_text("absent", "x");
        assert!(!must.matches(&payload("x")));

        // An exclusion on a missing key cannot fire
        let must_not = StructuralFilter::new().exclude_text("absent", "x");
        assert!(must_not.matches(&payload("x")));
    }

    #[test]
    fn test_exact_value_predicate() {
        let mut filter = StructuralFilter::new();
        filter.must.push(FieldCondition::value("name", "Oats"));
        assert!(filter.matches(&payload("whatever")));

        let mut strict = StructuralFilter::new();
        strict.must.push(FieldCondition::value("name", "Oat"));
        assert!(!strict.matches(&payload("whatever")));
    }

    #[test]
    fn test_wire_shape() {
        let filter = StructuralFilter::new()
            .require_text("search_text", "breakfast")
            .exclude_text("search_text", "butter");

        let wire = serde_json::to_value(&filter).expect("Failed to serialize filter");
        assert_eq!(
            wire,
            json!({
                "must": [
                    {"key": "search_text", "match": {"text": "breakfast"}}
                ],
                "must_not": [
                    {"key": "search_text", "match": {"text": "butter"}}
                ]
            })
        );
    }

    #[test]
    fn test_empty_clauses_omitted_from_wire() {
        let wire = serde_json::to_value(StructuralFilter::new()).expect("Failed to serialize");
        assert_eq!(wire, json!({}));
    }
}
