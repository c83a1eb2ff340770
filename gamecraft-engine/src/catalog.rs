//! # Renderer Catalog
//!
//! A structured description of every renderer kind that can be serialized
//! and given to the model as context. The design step reads the whole
//! catalog to pick a mechanic; the build step quotes the entry for the chosen
//! kind so the model knows the exact round shape the validator expects.

use crate::spec::GameKind;
use crate::validate;
use serde::Serialize;

/// Everything the model needs to know about the available renderers
#[derive(Debug, Clone, Serialize)]
pub struct RendererCatalog {
    pub version: &'static str,
    pub description: &'static str,
    pub renderers: Vec<RendererEntry>,
    pub guidelines: Vec<Guideline>,
}

impl Default for RendererCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererCatalog {
    pub fn new() -> Self {
        Self {
            version: "0.1.0",
            description: "Prebuilt interactive renderers for learning games. Each renderer \
                         takes an ordered list of rounds; every round is one screen the \
                         learner plays through before the next appears.",
            renderers: GameKind::ALL.into_iter().map(RendererEntry::for_kind).collect(),
            guidelines: Self::define_guidelines(),
        }
    }

    pub fn entry(&self, kind: GameKind) -> Option<&RendererEntry> {
        self.renderers.iter().find(|e| e.kind == kind)
    }

    /// Render as a prompt-friendly string for the model
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();

        out.push_str("# Available Renderers\n\n");
        out.push_str(self.description);
        out.push_str("\n\n");

        for entry in &self.renderers {
            out.push_str(&entry.to_prompt());
            out.push('\n');
        }

        out.push_str("## Guidelines\n\n");
        for g in &self.guidelines {
            out.push_str(&format!("### {}\n{}\n\n", g.title, g.content));
        }

        out
    }

    /// Render as JSON for structured consumption
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn define_guidelines() -> Vec<Guideline> {
        vec![
            Guideline {
                title: "Match the mechanic to the concept",
                content: "Classification concepts suit bucket_sort; relationships between ideas suit \
                         concept_map; sequences and causality suit timeline; recall and \
                         misconception checks suit quiz; pairings of terms and definitions suit \
                         matching. Use custom only when no prebuilt renderer can express the idea.",
            },
            Guideline {
                title: "Target the learner's gaps",
                content: "Rounds should exercise the listed gaps and misconceptions, starting from \
                         something the learner already handles and ending at the stated difficulty.",
            },
            Guideline {
                title: "Keep rounds small",
                content: "A round should be answerable in under two minutes. Prefer several short \
                         rounds over one large one.",
            },
            Guideline {
                title: "Ids are references",
                content: "Ids must be unique inside a round and every reference (bucket index, edge \
                         endpoint, order entry, match) must point at something that exists.",
            },
        ]
    }
}

/// One renderer kind and the shape of its rounds
#[derive(Debug, Clone, Serialize)]
pub struct RendererEntry {
    pub kind: GameKind,
    pub description: &'static str,
    pub best_for: &'static str,
    pub fields: Vec<FieldSpec>,
    /// Constraints the schema validator enforces
    pub rules: Vec<String>,
    pub example_round: serde_json::Value,
}

/// A field of a round config
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: &'static str,
    pub description: &'static str,
}

const fn field(name: &'static str, shape: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { name, shape, description }
}

fn bound_rule(what: &str, bounds: validate::Bounds) -> String {
    format!("{}: {}..={}", what, bounds.min, bounds.max)
}

impl RendererEntry {
    pub fn for_kind(kind: GameKind) -> Self {
        use serde_json::json;

        match kind {
            GameKind::BucketSort => Self {
                kind,
                description: "Drag each item into the bucket it belongs to.",
                best_for: "classification, sorting by property, telling similar categories apart",
                fields: vec![
                    field("prompt", "string", "Instruction shown above the buckets"),
                    field("buckets", "[{label}]", "Target categories, in display order"),
                    field("items", "[{id, label, correctBucket}]", "correctBucket is a 0-based index into buckets"),
                ],
                rules: vec![
                    bound_rule("buckets", validate::BUCKETS),
                    bound_rule("items", validate::BUCKET_ITEMS),
                    "item ids unique; correctBucket < number of buckets".into(),
                ],
                example_round: json!({
                    "prompt": "Is it a solid, a liquid or a gas at room temperature?",
                    "buckets": [{ "label": "Solid" }, { "label": "Liquid" }, { "label": "Gas" }],
                    "items": [
                        { "id": "iron", "label": "Iron", "correctBucket": 0 },
                        { "id": "water", "label": "Water", "correctBucket": 1 },
                        { "id": "helium", "label": "Helium", "correctBucket": 2 }
                    ]
                }),
            },
            GameKind::ConceptMap => Self {
                kind,
                description: "Connect concept nodes with labelled relationships.",
                best_for: "cause and effect, part-whole structure, systems with interacting parts",
                fields: vec![
                    field("prompt", "string", "What the learner should connect"),
                    field("nodes", "[{id, label}]", "Concepts on the canvas"),
                    field("edges", "[{from, to, label}]", "Correct relationships between node ids"),
                ],
                rules: vec![
                    bound_rule("nodes", validate::NODES),
                    bound_rule("edges", validate::EDGES),
                    "node ids unique; edge endpoints must be node ids".into(),
                ],
                example_round: json!({
                    "prompt": "Build the food chain",
                    "nodes": [
                        { "id": "sun", "label": "Sun" },
                        { "id": "grass", "label": "Grass" },
                        { "id": "rabbit", "label": "Rabbit" }
                    ],
                    "edges": [
                        { "from": "sun", "to": "grass", "label": "powers" },
                        { "from": "grass", "to": "rabbit", "label": "feeds" }
                    ]
                }),
            },
            GameKind::Timeline => Self {
                kind,
                description: "Arrange events into their correct order.",
                best_for: "chronology, process steps, causal chains",
                fields: vec![
                    field("prompt", "string", "What is being ordered"),
                    field("events", "[{id, label, detail?}]", "Events, shown shuffled"),
                    field("correctOrder", "[eventId]", "Every event id exactly once, in order"),
                ],
                rules: vec![
                    bound_rule("events", validate::EVENTS),
                    "correctOrder is a permutation of the event ids".into(),
                ],
                example_round: json!({
                    "prompt": "Order the stages of mitosis",
                    "events": [
                        { "id": "pro", "label": "Prophase" },
                        { "id": "meta", "label": "Metaphase" },
                        { "id": "ana", "label": "Anaphase", "detail": "chromatids separate" }
                    ],
                    "correctOrder": ["pro", "meta", "ana"]
                }),
            },
            GameKind::Quiz => Self {
                kind,
                description: "Multiple-choice questions with optional explanations.",
                best_for: "checking recall, surfacing misconceptions with targeted distractors",
                fields: vec![
                    field("prompt", "string?", "Optional round heading"),
                    field(
                        "questions",
                        "[{prompt, options, correctIndex, explanation?}]",
                        "correctIndex is a 0-based index into options",
                    ),
                ],
                rules: vec![
                    bound_rule("questions", validate::QUESTIONS),
                    bound_rule("options per question", validate::OPTIONS),
                    "correctIndex < number of options".into(),
                ],
                example_round: json!({
                    "questions": [{
                        "prompt": "Which force keeps planets in orbit?",
                        "options": ["Magnetism", "Gravity", "Friction"],
                        "correctIndex": 1,
                        "explanation": "Gravity supplies the centripetal force."
                    }]
                }),
            },
            GameKind::Matching => Self {
                kind,
                description: "Pair every item on the left with one on the right.",
                best_for: "vocabulary, term-definition pairs, symbol-meaning pairs",
                fields: vec![
                    field("prompt", "string", "Instruction for the pairing"),
                    field("left", "[{id, label}]", "Left column"),
                    field("right", "[{id, label}]", "Right column, shown shuffled"),
                    field("matches", "[{left, right}]", "Correct pairs by id"),
                ],
                rules: vec![
                    bound_rule("left and right items", validate::MATCH_ITEMS),
                    "every left id is matched exactly once; ids must exist".into(),
                ],
                example_round: json!({
                    "prompt": "Match each element to its symbol",
                    "left": [{ "id": "na", "label": "Sodium" }, { "id": "k", "label": "Potassium" }],
                    "right": [{ "id": "s1", "label": "Na" }, { "id": "s2", "label": "K" }],
                    "matches": [{ "left": "na", "right": "s1" }, { "left": "k", "right": "s2" }]
                }),
            },
            GameKind::Custom => Self {
                kind,
                description: "A freeform component named Game, written in JSX, rendered inside a sandbox.",
                best_for: "simulations and mechanics no prebuilt renderer supports",
                fields: vec![
                    field("source", "string", "JSX defining `function Game({ config, onComplete, onProgress })`"),
                ],
                rules: vec![
                    "no network, storage, eval or ambient globals (window, document, globalThis)".into(),
                    "no import statements; React hooks arrive as plain identifiers".into(),
                    format!("at most {} lines", crate::sandbox::MAX_SOURCE_LINES),
                    "call onComplete(score) exactly once when the learner finishes".into(),
                ],
                example_round: json!({ "round": 1, "focus": "balance the lever", "contentSeed": "2kg at 3m" }),
            },
        }
    }

    pub fn to_prompt(&self) -> String {
        let mut out = format!("## {}\n{}\nBest for: {}\n\n", self.kind, self.description, self.best_for);
        out.push_str("Round fields:\n");
        for f in &self.fields {
            out.push_str(&format!("- `{}` ({}): {}\n", f.name, f.shape, f.description));
        }
        out.push_str("Rules:\n");
        for r in &self.rules {
            out.push_str(&format!("- {}\n", r));
        }
        out.push_str(&format!(
            "Example round:\n```json\n{}\n```\n",
            serde_json::to_string_pretty(&self.example_round).unwrap_or_default()
        ));
        out
    }
}

/// A guideline for game design
#[derive(Debug, Clone, Serialize)]
pub struct Guideline {
    pub title: &'static str,
    pub content: &'static str,
}
