//! # Critic
//!
//! One model call that scores a structurally valid candidate on a fixed
//! rubric. The model supplies scores and feedback; pass/fail is always
//! computed here so a generous model cannot wave a weak game through.

use crate::config::PipelineConfig;
use crate::prompts;
use crate::tools::{self, ToolReply};
use gamecraft_engine::{GameSpec, LlmProvider, RendererConfig};
use gamecraft_error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DIMENSIONS: [&str; 4] = [
    "structural_correctness",
    "content_accuracy",
    "playability",
    "educational_value",
];

pub const MAX_SCORE: u8 = 3;
/// Every dimension must reach this
pub const MIN_DIMENSION_SCORE: u8 = 2;
/// Out of 12
pub const PASS_TOTAL: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticDimension {
    pub name: String,
    pub score: u8,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticResult {
    pub passed: bool,
    pub total: u8,
    pub dimensions: Vec<CriticDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_instructions: Option<String>,
}

impl CriticResult {
    /// Compute total and verdict from dimension scores
    pub fn evaluate(dimensions: Vec<CriticDimension>, revision_instructions: Option<String>) -> Self {
        let total = dimensions.iter().map(|d| d.score).sum();
        let passed = dimensions.len() == DIMENSIONS.len()
            && dimensions.iter().all(|d| d.score >= MIN_DIMENSION_SCORE)
            && total >= PASS_TOTAL;
        Self {
            passed,
            total,
            dimensions,
            revision_instructions,
        }
    }

    /// Synthetic verdict for a candidate that never reached the critic
    pub fn structural_failure(violations: &[String]) -> Self {
        let dimensions = DIMENSIONS
            .iter()
            .map(|&name| CriticDimension {
                name: name.to_string(),
                score: 0,
                feedback: if name == "structural_correctness" {
                    format!("{} structural problem(s)", violations.len())
                } else {
                    "not evaluated".to_string()
                },
            })
            .collect();
        Self::evaluate(dimensions, Some(violations.join("\n")))
    }

    /// Verdict for a valid candidate the critic could not score. It fails,
    /// so the attempt still counts against the budget.
    pub fn unscored(reason: &str) -> Self {
        let dimensions = DIMENSIONS
            .iter()
            .map(|&name| CriticDimension {
                name: name.to_string(),
                score: 0,
                feedback: "not evaluated".to_string(),
            })
            .collect();
        Self::evaluate(
            dimensions,
            Some(format!(
                "The review of this candidate could not be read ({}). Keep what is correct and improve the weakest rounds.",
                reason
            )),
        )
    }

    /// Read `submit_critique` arguments.
    ///
    /// `dimensions` may be an object keyed by name or an array of
    /// `{name, score, feedback}`. Missing dimensions score 0 and scores
    /// are clamped to 0..=3.
    pub fn from_value(value: &Value) -> Self {
        let raw = value.get("dimensions");
        let lookup = |name: &str| -> Option<&Value> {
            match raw? {
                Value::Object(map) => map.get(name),
                Value::Array(items) => items
                    .iter()
                    .find(|item| item.get("name").and_then(Value::as_str) == Some(name)),
                _ => None,
            }
        };

        let dimensions = DIMENSIONS
            .iter()
            .map(|&name| match lookup(name) {
                Some(entry) => CriticDimension {
                    name: name.to_string(),
                    score: score_of(entry),
                    feedback: entry
                        .get("feedback")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                None => CriticDimension {
                    name: name.to_string(),
                    score: 0,
                    feedback: "missing from critique".to_string(),
                },
            })
            .collect();

        let instructions = value
            .get("revision_instructions")
            .or_else(|| value.get("revisionInstructions"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self::evaluate(dimensions, instructions)
    }

    /// Feedback for the next revision: explicit instructions first, then
    /// whatever the weak dimensions said
    pub fn feedback(&self) -> String {
        let mut lines = Vec::new();
        if let Some(instructions) = &self.revision_instructions {
            lines.push(instructions.clone());
        }
        for d in &self.dimensions {
            if d.score < MAX_SCORE && !d.feedback.is_empty() && d.feedback != "not evaluated" {
                lines.push(format!("- {} ({}/{}): {}", d.name, d.score, MAX_SCORE, d.feedback));
            }
        }
        lines.join("\n")
    }
}

fn score_of(entry: &Value) -> u8 {
    let score = entry.get("score").unwrap_or(entry);
    let n = score
        .as_f64()
        .or_else(|| score.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(0.0);
    n.round().clamp(0.0, MAX_SCORE as f64) as u8
}

pub struct Critic<'a, P: LlmProvider> {
    provider: &'a P,
    config: &'a PipelineConfig,
}

impl<'a, P: LlmProvider> Critic<'a, P> {
    pub fn new(provider: &'a P, config: &'a PipelineConfig) -> Self {
        Self { provider, config }
    }

    /// Score one candidate. Returns the verdict and the raw reply for usage
    /// accounting.
    pub async fn critique(&self, spec: &GameSpec, candidate: &RendererConfig) -> Result<(CriticResult, ToolReply)> {
        let reply = tools::call_tool(
            self.provider,
            self.config,
            prompts::critique(spec, candidate),
            tools::submit_critique(),
            "critic::critique",
        )
        .await
        .map_err(|e| {
            // A reply that came back but cannot be read as a critique;
            // provider and transport errors pass through as they are
            if e.kind().is_revisable() {
                Error::critic_failed(e.message().to_string())
                    .with_operation("critic::critique")
                    .set_source(e)
            } else {
                e
            }
        })?;
        Ok((CriticResult::from_value(&reply.arguments), reply))
    }
}
