//! # Schema Validator
//!
//! Structural rules for every structured renderer kind. Validation runs on the
//! raw JSON the model produced, before anything is deserialized, so that a
//! missing field becomes a readable violation instead of a serde error.
//!
//! Rules per kind:
//! - required fields and non-empty strings
//! - integer-typed indices
//! - array length bounds (see [`Bounds`])
//! - id uniqueness and referential integrity between arrays
//!
//! Violations are returned, never thrown.

use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::spec::GameKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Inclusive length bound for one array field
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min: usize,
    pub max: usize,
}

const fn bounds(min: usize, max: usize) -> Bounds {
    Bounds { min, max }
}

pub const ROUNDS: Bounds = bounds(1, 10);
pub const BUCKETS: Bounds = bounds(2, 6);
pub const BUCKET_ITEMS: Bounds = bounds(2, 20);
pub const NODES: Bounds = bounds(2, 12);
pub const EDGES: Bounds = bounds(1, 30);
pub const EVENTS: Bounds = bounds(2, 10);
pub const QUESTIONS: Bounds = bounds(1, 10);
pub const OPTIONS: Bounds = bounds(2, 6);
pub const MATCH_ITEMS: Bounds = bounds(2, 8);

/// Outcome of validating one candidate config
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub kind: GameKind,
    pub valid: bool,
    pub violations: Vec<String>,
}

impl ValidationReport {
    /// Convert the validated value into its typed config
    pub fn into_config(self, candidate: &Value) -> Result<RendererConfig> {
        if !self.valid {
            return Err(Error::validation_failed(&self.violations).with_operation("validate::into_config"));
        }
        let mut tagged = candidate.clone();
        if let Some(obj) = tagged.as_object_mut() {
            obj.insert("kind".into(), Value::String(self.kind.as_str().into()));
        }
        serde_json::from_value(tagged).map_err(|e| {
            Error::validation_failed(&[format!("config does not match the {} shape: {}", self.kind, e)])
                .with_operation("validate::into_config")
                .set_source(e)
        })
    }
}

/// Validate a candidate structured config against its kind's rule set
pub fn validate(kind: GameKind, candidate: &Value) -> ValidationReport {
    let mut violations = Vec::new();

    if !candidate.is_object() {
        violations.push("config must be a JSON object with a `rounds` array".to_string());
    } else {
        let mut top = Rules::new(&mut violations, "config".to_string());
        if let Some(rounds) = top.array(candidate, "rounds", ROUNDS) {
            for (i, round) in rounds.iter().enumerate() {
                let mut rules = Rules::new(&mut violations, format!("round {}", i + 1));
                if !round.is_object() {
                    rules.fail("must be an object");
                    continue;
                }
                match kind {
                    GameKind::BucketSort => check_bucket_sort(&mut rules, round),
                    GameKind::ConceptMap => check_concept_map(&mut rules, round),
                    GameKind::Timeline => check_timeline(&mut rules, round),
                    GameKind::Quiz => check_quiz(&mut rules, round),
                    GameKind::Matching => check_matching(&mut rules, round),
                    GameKind::Custom => {
                        rules.fail("custom components are checked by the sandbox, not the schema validator");
                        break;
                    }
                }
            }
        }
    }

    ValidationReport {
        kind,
        valid: violations.is_empty(),
        violations,
    }
}

// ============================================================================
// Per-kind rule sets
// ============================================================================

fn check_bucket_sort(rules: &mut Rules, round: &Value) {
    rules.string(round, "prompt");
    let bucket_count = rules.array(round, "buckets", BUCKETS).map(|buckets| {
        for (i, bucket) in buckets.iter().enumerate() {
            rules.nested_string(bucket, "label", &format!("buckets[{}]", i));
        }
        buckets.len()
    });

    let Some(items) = rules.array(round, "items", BUCKET_ITEMS) else {
        return;
    };
    rules.unique_ids(items, "items");
    for (i, item) in items.iter().enumerate() {
        let name = item_name(item, "items", i);
        rules.nested_string(item, "label", &name);
        let Some(bucket) = rules.nested_index(item, "correctBucket", &name) else {
            continue;
        };
        if let Some(count) = bucket_count {
            if bucket as usize >= count {
                rules.fail(format!(
                    "{} correctBucket {} is out of range 0..={}",
                    name,
                    bucket,
                    count.saturating_sub(1)
                ));
            }
        }
    }
}

fn check_concept_map(rules: &mut Rules, round: &Value) {
    rules.string(round, "prompt");
    let node_ids = rules
        .array(round, "nodes", NODES)
        .map(|nodes| {
            for (i, node) in nodes.iter().enumerate() {
                rules.nested_string(node, "label", &item_name(node, "nodes", i));
            }
            rules.unique_ids(nodes, "nodes")
        })
        .unwrap_or_default();

    let Some(edges) = rules.array(round, "edges", EDGES) else {
        return;
    };
    for (i, edge) in edges.iter().enumerate() {
        let name = format!("edges[{}]", i);
        rules.nested_string(edge, "label", &name);
        for end in ["from", "to"] {
            if let Some(id) = rules.nested_string(edge, end, &name) {
                if !node_ids.contains(id) {
                    rules.fail(format!("{} `{}` references unknown node id '{}'", name, end, id));
                }
            }
        }
    }
}

fn check_timeline(rules: &mut Rules, round: &Value) {
    rules.string(round, "prompt");
    let event_ids = rules
        .array(round, "events", EVENTS)
        .map(|events| {
            for (i, event) in events.iter().enumerate() {
                rules.nested_string(event, "label", &item_name(event, "events", i));
            }
            rules.unique_ids(events, "events")
        })
        .unwrap_or_default();

    let Some(order) = rules.array(round, "correctOrder", bounds(1, usize::MAX)) else {
        return;
    };
    let mut seen = HashSet::new();
    for (i, entry) in order.iter().enumerate() {
        match entry.as_str() {
            Some(id) if !event_ids.contains(id) => {
                rules.fail(format!("correctOrder[{}] references unknown event id '{}'", i, id));
            }
            Some(id) => {
                if !seen.insert(id) {
                    rules.fail(format!("correctOrder lists event '{}' more than once", id));
                }
            }
            None => rules.fail(format!("correctOrder[{}] must be an event id string", i)),
        }
    }
    let mut missing: Vec<&str> = event_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !seen.contains(id))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        rules.fail(format!(
            "correctOrder is not a permutation of the events; missing: {}",
            missing.join(", ")
        ));
    }
}

fn check_quiz(rules: &mut Rules, round: &Value) {
    let Some(questions) = rules.array(round, "questions", QUESTIONS) else {
        return;
    };
    for (i, question) in questions.iter().enumerate() {
        let name = format!("questions[{}]", i);
        rules.nested_string(question, "prompt", &name);
        let option_count = match question.get("options").and_then(Value::as_array) {
            Some(options) => {
                if options.len() < OPTIONS.min || options.len() > OPTIONS.max {
                    rules.fail(format!(
                        "{} must have {}..={} options, found {}",
                        name,
                        OPTIONS.min,
                        OPTIONS.max,
                        options.len()
                    ));
                }
                if options.iter().any(|o| o.as_str().map_or(true, |s| s.trim().is_empty())) {
                    rules.fail(format!("{} options must be non-empty strings", name));
                }
                Some(options.len())
            }
            None => {
                rules.fail(format!("{} is missing `options` array", name));
                None
            }
        };
        if let (Some(index), Some(count)) = (rules.nested_index(question, "correctIndex", &name), option_count) {
            if index as usize >= count {
                rules.fail(format!(
                    "{} correctIndex {} is out of range 0..={}",
                    name,
                    index,
                    count.saturating_sub(1)
                ));
            }
        }
    }
}

fn check_matching(rules: &mut Rules, round: &Value) {
    rules.string(round, "prompt");
    let mut sides: HashMap<&str, HashSet<String>> = HashMap::new();
    for side in ["left", "right"] {
        if let Some(items) = rules.array(round, side, MATCH_ITEMS) {
            for (i, item) in items.iter().enumerate() {
                rules.nested_string(item, "label", &item_name(item, side, i));
            }
            sides.insert(side, rules.unique_ids(items, side));
        }
    }

    let Some(matches) = rules.array(round, "matches", bounds(1, MATCH_ITEMS.max)) else {
        return;
    };
    let mut matched_left: HashMap<String, usize> = HashMap::new();
    for (i, pair) in matches.iter().enumerate() {
        let name = format!("matches[{}]", i);
        for side in ["left", "right"] {
            let Some(id) = rules.nested_string(pair, side, &name) else {
                continue;
            };
            if let Some(ids) = sides.get(side) {
                if !ids.contains(id) {
                    rules.fail(format!("{} references unknown {} id '{}'", name, side, id));
                }
            }
            if side == "left" {
                *matched_left.entry(id.to_string()).or_default() += 1;
            }
        }
    }
    if let Some(left_ids) = sides.get("left") {
        let mut ids: Vec<&String> = left_ids.iter().collect();
        ids.sort();
        for id in ids {
            match matched_left.get(id).copied().unwrap_or(0) {
                1 => {}
                0 => rules.fail(format!("left item '{}' has no match", id)),
                n => rules.fail(format!("left item '{}' is matched {} times", id, n)),
            }
        }
    }
}

// ============================================================================
// Rule helpers
// ============================================================================

fn item_name(item: &Value, array: &str, index: usize) -> String {
    match item.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => format!("{} '{}' ({}[{}])", singular(array), id, array, index),
        _ => format!("{}[{}]", array, index),
    }
}

fn singular(array: &str) -> &str {
    match array {
        "items" => "item",
        "nodes" => "node",
        "events" => "event",
        other => other,
    }
}

/// Collects violations under a path prefix such as `round 2`
struct Rules<'a> {
    violations: &'a mut Vec<String>,
    path: String,
}

impl<'a> Rules<'a> {
    fn new(violations: &'a mut Vec<String>, path: String) -> Self {
        Self { violations, path }
    }

    fn fail(&mut self, message: impl AsRef<str>) {
        self.violations.push(format!("{}: {}", self.path, message.as_ref()));
    }

    fn array<'v>(&mut self, obj: &'v Value, key: &str, bounds: Bounds) -> Option<&'v Vec<Value>> {
        match obj.get(key) {
            Some(Value::Array(items)) => {
                if items.len() < bounds.min || items.len() > bounds.max {
                    if bounds.max == usize::MAX {
                        self.fail(format!("`{}` must have at least {} entries, found {}", key, bounds.min, items.len()));
                    } else {
                        self.fail(format!(
                            "`{}` must have {}..={} entries, found {}",
                            key,
                            bounds.min,
                            bounds.max,
                            items.len()
                        ));
                    }
                }
                Some(items)
            }
            Some(_) => {
                self.fail(format!("`{}` must be an array", key));
                None
            }
            None => {
                self.fail(format!("missing required field `{}`", key));
                None
            }
        }
    }

    fn string<'v>(&mut self, obj: &'v Value, key: &str) -> Option<&'v str> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Some(s),
            Some(_) => {
                self.fail(format!("`{}` must not be empty", key));
                None
            }
            None => {
                self.fail(format!("missing required string `{}`", key));
                None
            }
        }
    }

    fn nested_string<'v>(&mut self, obj: &'v Value, key: &str, owner: &str) -> Option<&'v str> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Some(s),
            _ => {
                self.fail(format!("{} is missing a non-empty `{}`", owner, key));
                None
            }
        }
    }

    fn nested_index(&mut self, obj: &Value, key: &str, owner: &str) -> Option<u64> {
        match obj.get(key) {
            Some(v) => match v.as_u64() {
                Some(n) => Some(n),
                None => {
                    self.fail(format!("{} `{}` must be a non-negative integer, found {}", owner, key, v));
                    None
                }
            },
            None => {
                self.fail(format!("{} is missing `{}`", owner, key));
                None
            }
        }
    }

    /// Every entry needs a non-empty, unique `id`; returns the id set
    fn unique_ids(&mut self, items: &[Value], array: &str) -> HashSet<String> {
        let mut ids = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            match item.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
                Some(id) => {
                    if !ids.insert(id.to_string()) {
                        self.fail(format!("duplicate id '{}' in `{}`", id, array));
                    }
                }
                None => self.fail(format!("{}[{}] is missing a non-empty `id`", array, i)),
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket_round() -> Value {
        json!({
            "prompt": "Sort each substance by its state at room temperature",
            "buckets": [
                { "label": "Solid" }, { "label": "Liquid" },
                { "label": "Gas" }, { "label": "Plasma" }
            ],
            "items": [
                { "id": "ice", "label": "Ice", "correctBucket": 0 },
                { "id": "iron", "label": "Iron", "correctBucket": 0 },
                { "id": "water", "label": "Water", "correctBucket": 1 },
                { "id": "mercury", "label": "Mercury", "correctBucket": 1 },
                { "id": "oxygen", "label": "Oxygen", "correctBucket": 2 },
                { "id": "lightning", "label": "Lightning", "correctBucket": 3 }
            ]
        })
    }

    #[test]
    fn test_bucket_sort_valid_then_out_of_range() {
        let mut config = json!({ "rounds": [bucket_round()] });
        let report = validate(GameKind::BucketSort, &config);
        assert!(report.valid, "{:?}", report.violations);

        config["rounds"][0]["items"][4]["correctBucket"] = json!(4);
        let report = validate(GameKind::BucketSort, &config);
        assert!(!report.valid);
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("'oxygen'"), "{}", report.violations[0]);
        assert!(report.violations[0].contains("correctBucket 4"));
    }

    #[test]
    fn test_into_config_builds_typed_variant() {
        let config = json!({ "rounds": [bucket_round()] });
        let report = validate(GameKind::BucketSort, &config);
        let typed = report.into_config(&config).unwrap();
        match typed {
            RendererConfig::BucketSort { rounds } => {
                assert_eq!(rounds[0].buckets.len(), 4);
                assert_eq!(rounds[0].items[5].correct_bucket, 3);
            }
            other => panic!("unexpected variant {:?}", other.kind()),
        }
    }

    #[test]
    fn test_into_config_rejects_invalid_report() {
        let config = json!({ "rounds": [] });
        let report = validate(GameKind::Quiz, &config);
        assert!(!report.valid);
        assert!(report.into_config(&config).is_err());
    }

    #[test]
    fn test_concept_map_unknown_edge_endpoint() {
        let config = json!({ "rounds": [{
            "prompt": "Connect the food chain",
            "nodes": [
                { "id": "sun", "label": "Sun" },
                { "id": "grass", "label": "Grass" }
            ],
            "edges": [
                { "from": "sun", "to": "grass", "label": "feeds" },
                { "from": "grass", "to": "rabbit", "label": "eaten by" }
            ]
        }]});
        let report = validate(GameKind::ConceptMap, &config);
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("unknown node id 'rabbit'"));
    }

    #[test]
    fn test_timeline_requires_permutation() {
        let mut config = json!({ "rounds": [{
            "prompt": "Order the events",
            "events": [
                { "id": "a", "label": "Printing press" },
                { "id": "b", "label": "Steam engine" },
                { "id": "c", "label": "Telegraph" }
            ],
            "correctOrder": ["a", "b", "c"]
        }]});
        assert!(validate(GameKind::Timeline, &config).valid);

        config["rounds"][0]["correctOrder"] = json!(["a", "b", "b"]);
        let report = validate(GameKind::Timeline, &config);
        assert!(!report.valid);
        assert!(report.violations.iter().any(|v| v.contains("more than once")));
        assert!(report.violations.iter().any(|v| v.contains("missing: c")));

        config["rounds"][0]["correctOrder"] = json!(["a", "b", "c", "z"]);
        let report = validate(GameKind::Timeline, &config);
        assert!(report.violations.iter().any(|v| v.contains("unknown event id 'z'")));
    }

    #[test]
    fn test_quiz_index_bounds_and_types() {
        let config = json!({ "rounds": [{
            "questions": [
                { "prompt": "2+2?", "options": ["3", "4"], "correctIndex": 1 },
                { "prompt": "3+3?", "options": ["6", "7"], "correctIndex": 2 },
                { "prompt": "4+4?", "options": ["8", "9"], "correctIndex": -1 }
            ]
        }]});
        let report = validate(GameKind::Quiz, &config);
        assert_eq!(report.violations.len(), 2, "{:?}", report.violations);
        assert!(report.violations[0].contains("questions[1] correctIndex 2 is out of range 0..=1"));
        assert!(report.violations[1].contains("non-negative integer"));
    }

    #[test]
    fn test_matching_every_left_matched_once() {
        let config = json!({ "rounds": [{
            "prompt": "Match capitals",
            "left": [{ "id": "fr", "label": "France" }, { "id": "jp", "label": "Japan" }],
            "right": [{ "id": "paris", "label": "Paris" }, { "id": "tokyo", "label": "Tokyo" }],
            "matches": [
                { "left": "fr", "right": "paris" },
                { "left": "fr", "right": "tokyo" }
            ]
        }]});
        let report = validate(GameKind::Matching, &config);
        assert!(report.violations.iter().any(|v| v.contains("'fr' is matched 2 times")));
        assert!(report.violations.iter().any(|v| v.contains("'jp' has no match")));
    }

    #[test]
    fn test_missing_fields_and_bounds() {
        let report = validate(GameKind::BucketSort, &json!({ "rounds": [{ "buckets": [{ "label": "only" }] }] }));
        assert!(report.violations.iter().any(|v| v.contains("missing required string `prompt`")));
        assert!(report.violations.iter().any(|v| v.contains("`buckets` must have 2..=6 entries, found 1")));
        assert!(report.violations.iter().any(|v| v.contains("missing required field `items`")));

        let report = validate(GameKind::Timeline, &json!([1, 2]));
        assert!(!report.valid);
    }

    #[test]
    fn test_duplicate_ids_reported() {
        let mut round = bucket_round();
        round["items"][1]["id"] = json!("ice");
        let report = validate(GameKind::BucketSort, &json!({ "rounds": [round] }));
        assert!(report.violations.iter().any(|v| v.contains("duplicate id 'ice'")));
    }

    #[test]
    fn test_custom_kind_is_not_schema_validated() {
        let report = validate(GameKind::Custom, &json!({ "rounds": [{}] }));
        assert!(!report.valid);
        assert!(report.violations[0].contains("sandbox"));
    }
}
