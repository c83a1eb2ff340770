//! # Game Spec
//!
//! The design-level description of an exercise, produced once per run by the
//! design step. The only mutation allowed afterwards is a forced kind override.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The renderer an artifact targets.
///
/// Closed set: adding a kind means adding a variant here plus its arm in the
/// validator, the catalog and `RendererConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    BucketSort,
    ConceptMap,
    Timeline,
    Quiz,
    Matching,
    Custom,
}

impl GameKind {
    pub const ALL: [GameKind; 6] = [
        GameKind::BucketSort,
        GameKind::ConceptMap,
        GameKind::Timeline,
        GameKind::Quiz,
        GameKind::Matching,
        GameKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::BucketSort => "bucket_sort",
            GameKind::ConceptMap => "concept_map",
            GameKind::Timeline => "timeline",
            GameKind::Quiz => "quiz",
            GameKind::Matching => "matching",
            GameKind::Custom => "custom",
        }
    }

    /// Structured kinds are schema-validated; custom is sandboxed
    pub fn is_structured(&self) -> bool {
        !matches!(self, GameKind::Custom)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        GameKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| Error::invalid_argument(format!("unknown game kind '{}'", s)).with_context("kind", s))
    }
}

/// Why this exercise, for this learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rationale {
    pub concept: String,
    pub pedagogical_goal: String,
    pub why_this_mechanic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSpec {
    pub round: u32,
    pub focus: String,
    #[serde(default)]
    pub content_seed: String,
}

/// A win condition: prose for people, pseudocode for the critic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequirement {
    pub description: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSpec {
    pub id: String,
    pub title: String,
    pub kind: GameKind,
    pub rationale: Rationale,
    pub difficulty: u8,
    pub rounds: Vec<RoundSpec>,
    #[serde(default)]
    pub completion: Vec<CompletionRequirement>,
}

impl GameSpec {
    /// Interpret loosely-shaped model output as a spec.
    ///
    /// Minimal requirements are a title, a concept, a known kind and at least
    /// one round with a focus. Everything else is defaulted: the id is
    /// generated when absent, difficulty is clamped into 1..=5 and round
    /// numbers are filled from position.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut missing = Vec::new();

        let title = non_empty(value, "title");
        if title.is_none() {
            missing.push("title".to_string());
        }

        let rationale = value.get("rationale").unwrap_or(value);
        let concept = non_empty(rationale, "concept");
        if concept.is_none() {
            missing.push("rationale.concept".to_string());
        }

        let kind = match value.get("kind").and_then(Value::as_str) {
            Some(raw) => match raw.parse::<GameKind>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    missing.push(format!("kind (unknown '{}')", raw));
                    None
                }
            },
            None => {
                missing.push("kind".to_string());
                None
            }
        };

        let rounds: Vec<RoundSpec> = value
            .get("rounds")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let focus = non_empty(item, "focus")?;
                        Some(RoundSpec {
                            round: item
                                .get("round")
                                .and_then(Value::as_u64)
                                .map(|n| n as u32)
                                .unwrap_or(i as u32 + 1),
                            focus,
                            content_seed: non_empty(item, "contentSeed")
                                .or_else(|| non_empty(item, "content_seed"))
                                .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if rounds.is_empty() {
            missing.push("rounds".to_string());
        }

        let (Some(title), Some(concept), Some(kind), false) = (title, concept, kind, rounds.is_empty()) else {
            return Err(Error::design_failed(format!(
                "spec is missing required fields: {}",
                missing.join(", ")
            ))
            .with_operation("spec::from_value"));
        };

        let completion = value
            .get("completion")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(CompletionRequirement {
                            description: non_empty(item, "description")?,
                            condition: non_empty(item, "condition").unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let difficulty = value
            .get("difficulty")
            .and_then(Value::as_i64)
            .unwrap_or(2)
            .clamp(1, 5) as u8;

        Ok(Self {
            id: non_empty(value, "id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title,
            kind,
            rationale: Rationale {
                concept,
                pedagogical_goal: non_empty(rationale, "pedagogicalGoal")
                    .or_else(|| non_empty(rationale, "pedagogical_goal"))
                    .unwrap_or_default(),
                why_this_mechanic: non_empty(rationale, "whyThisMechanic")
                    .or_else(|| non_empty(rationale, "why_this_mechanic"))
                    .unwrap_or_default(),
            },
            difficulty,
            rounds,
            completion,
        })
    }

    /// The one permitted mutation: a caller-forced renderer kind
    pub fn with_kind(mut self, kind: GameKind) -> Self {
        self.kind = kind;
        self
    }
}

fn non_empty(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecraft_error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("bucket_sort".parse::<GameKind>().unwrap(), GameKind::BucketSort);
        assert_eq!("Concept-Map".parse::<GameKind>().unwrap(), GameKind::ConceptMap);
        assert!("crossword".parse::<GameKind>().is_err());
        assert!(!GameKind::Custom.is_structured());
    }

    #[test]
    fn test_from_value_fills_defaults() {
        let spec = GameSpec::from_value(&json!({
            "title": "States of Matter",
            "kind": "bucket_sort",
            "difficulty": 9,
            "rationale": { "concept": "phases", "pedagogicalGoal": "classify" },
            "rounds": [
                { "focus": "solids vs liquids", "contentSeed": "ice, water" },
                { "round": 7, "focus": "gases" }
            ]
        }))
        .unwrap();

        assert_eq!(spec.difficulty, 5);
        assert_eq!(spec.rounds[0].round, 1);
        assert_eq!(spec.rounds[1].round, 7);
        assert_eq!(spec.rationale.pedagogical_goal, "classify");
        assert!(!spec.id.is_empty());
    }

    #[test]
    fn test_from_value_reports_every_missing_field() {
        let err = GameSpec::from_value(&json!({ "kind": "crossword", "rounds": [] })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DesignFailed);
        assert!(err.message().contains("title"));
        assert!(err.message().contains("rationale.concept"));
        assert!(err.message().contains("crossword"));
        assert!(err.message().contains("rounds"));
    }

    #[test]
    fn test_with_kind_override() {
        let spec = GameSpec::from_value(&json!({
            "title": "t", "kind": "quiz", "concept": "c",
            "rounds": [{ "focus": "f" }]
        }))
        .unwrap()
        .with_kind(GameKind::Timeline);
        assert_eq!(spec.kind, GameKind::Timeline);
    }
}
