//! # Renderer Config
//!
//! The artifact handed to a renderer. One variant per [`GameKind`], each
//! carrying its ordered per-round configs. Structured variants are only ever
//! built from a value that passed [`crate::validate`]; the custom variant
//! carries compiled component source.

use crate::spec::{GameKind, RoundSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RendererConfig {
    BucketSort { rounds: Vec<BucketSortRound> },
    ConceptMap { rounds: Vec<ConceptMapRound> },
    Timeline { rounds: Vec<TimelineRound> },
    Quiz { rounds: Vec<QuizRound> },
    Matching { rounds: Vec<MatchingRound> },
    Custom(CustomComponent),
}

impl RendererConfig {
    pub fn kind(&self) -> GameKind {
        match self {
            RendererConfig::BucketSort { .. } => GameKind::BucketSort,
            RendererConfig::ConceptMap { .. } => GameKind::ConceptMap,
            RendererConfig::Timeline { .. } => GameKind::Timeline,
            RendererConfig::Quiz { .. } => GameKind::Quiz,
            RendererConfig::Matching { .. } => GameKind::Matching,
            RendererConfig::Custom(_) => GameKind::Custom,
        }
    }

    pub fn round_count(&self) -> usize {
        match self {
            RendererConfig::BucketSort { rounds } => rounds.len(),
            RendererConfig::ConceptMap { rounds } => rounds.len(),
            RendererConfig::Timeline { rounds } => rounds.len(),
            RendererConfig::Quiz { rounds } => rounds.len(),
            RendererConfig::Matching { rounds } => rounds.len(),
            RendererConfig::Custom(component) => component.rounds.len(),
        }
    }

    pub fn as_custom(&self) -> Option<&CustomComponent> {
        match self {
            RendererConfig::Custom(component) => Some(component),
            _ => None,
        }
    }
}

/// Freeform component source plus the rounds it was written for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomComponent {
    /// Source exactly as authored (and edited) by the model
    pub source: String,
    /// Output of the compile gate, what the renderer actually executes
    pub compiled: String,
    pub rounds: Vec<RoundSpec>,
}

// ============================================================================
// Bucket sort
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSortRound {
    pub prompt: String,
    pub buckets: Vec<Bucket>,
    pub items: Vec<BucketItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketItem {
    pub id: String,
    pub label: String,
    pub correct_bucket: usize,
}

// ============================================================================
// Concept map
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMapRound {
    pub prompt: String,
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

// ============================================================================
// Timeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRound {
    pub prompt: String,
    pub events: Vec<TimelineEvent>,
    /// Event ids in their correct order; a permutation of `events`
    pub correct_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ============================================================================
// Quiz
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

// ============================================================================
// Matching
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRound {
    pub prompt: String,
    pub left: Vec<MatchingItem>,
    pub right: Vec<MatchingItem>,
    pub matches: Vec<MatchPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingItem {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}
