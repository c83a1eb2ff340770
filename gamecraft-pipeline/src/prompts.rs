//! Prompt construction for each model call in a run

use crate::critic::DIMENSIONS;
use crate::profile::LearnerProfile;
use gamecraft_engine::{ChatMessage, GameKind, GameSpec, RendererCatalog, RendererConfig};
use serde::Serialize;
use serde_json::Value;

/// A system/user message pair
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Append why the previous attempt was rejected
    pub fn with_feedback(mut self, feedback: &str) -> Self {
        self.user.push_str(&format!("\n\n## Previous attempt was rejected\n{}", feedback));
        self
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system), ChatMessage::user(self.user)]
    }
}

const DESIGNER: &str = "You design short interactive learning games for one specific learner. \
A game teaches exactly one concept through a mechanic that makes the learner act on it, \
not read about it. Aim each round at a gap or misconception from the profile and raise \
difficulty across rounds.";

const BUILDER: &str = "You turn a game design into content for a fixed renderer. \
Facts must be correct; every id you reference must exist; the rounds follow the design in order.";

const COMPONENT_AUTHOR: &str = "You write a single self-contained JSX component named Game. \
It receives props { config, onComplete, onProgress }. React hooks (useState, useEffect, useRef, \
useMemo, useCallback, useReducer), h, Fragment and a frozen `theme` object are in scope as plain \
identifiers. There is no network, no storage, no window or document and no imports.";

const CRITIC: &str = "You review learning games before a learner sees them. Score each \
dimension from 0 (broken) to 3 (excellent) and be specific in feedback: name the round and the \
item. Do not award 3 unless you would ship it unchanged.";

fn context(profile: &LearnerProfile, topic: Option<&str>) -> String {
    let mut out = profile.to_prompt();
    if let Some(topic) = topic {
        out.push_str(&format!("\n## Topic\n{}\n", topic));
    }
    out
}

fn spec_section(spec: &GameSpec) -> String {
    format!(
        "## Design\n```json\n{}\n```\n",
        serde_json::to_string_pretty(spec).unwrap_or_default()
    )
}

fn json_block(value: &Value) -> String {
    format!("```json\n{}\n```", serde_json::to_string_pretty(value).unwrap_or_default())
}

fn kind_section(kind: GameKind) -> String {
    let catalog = RendererCatalog::new();
    catalog.entry(kind).map(|e| e.to_prompt()).unwrap_or_default()
}

/// Design step: pick a kind and plan the rounds
pub fn design(profile: &LearnerProfile, topic: Option<&str>, forced: Option<GameKind>) -> Prompt {
    let mut user = context(profile, topic);
    user.push_str("\n# Renderers\n");
    user.push_str(&RendererCatalog::new().to_prompt());
    match forced {
        Some(kind) => user.push_str(&format!("\nThe game must use the `{}` renderer.\n", kind)),
        None => user.push_str("\nChoose the renderer whose mechanic best fits the concept.\n"),
    }
    user.push_str("\nSubmit the design with `submit_game_spec`.");
    Prompt::new(DESIGNER, user)
}

/// Build step for structured kinds
pub fn build_config(profile: &LearnerProfile, spec: &GameSpec) -> Prompt {
    let user = format!(
        "{}\n{}\n# Renderer\n{}\nWrite one round config per designed round and submit them with `submit_config`.",
        profile.to_prompt(),
        spec_section(spec),
        kind_section(spec.kind)
    );
    Prompt::new(BUILDER, user)
}

/// Build step for the custom kind
pub fn build_component(profile: &LearnerProfile, spec: &GameSpec) -> Prompt {
    let user = format!(
        "{}\n{}\n# Component\n{}\n`config` is the array of designed rounds. Submit the source with `submit_component`.",
        profile.to_prompt(),
        spec_section(spec),
        kind_section(GameKind::Custom)
    );
    Prompt::new(COMPONENT_AUTHOR, user)
}

/// Regenerate a structured config from the previous candidate and its feedback
pub fn revise_config(spec: &GameSpec, previous: &Value, feedback: &str) -> Prompt {
    let user = format!(
        "{}\n# Renderer\n{}\n## Previous config\n{}\n\n## What to fix\n{}\n\n\
         Submit a complete corrected config with `submit_config`. Keep what was not criticised.",
        spec_section(spec),
        kind_section(spec.kind),
        json_block(previous),
        feedback
    );
    Prompt::new(BUILDER, user)
}

/// Ask for edits to component source
pub fn revise_component(spec: &GameSpec, source: &str, feedback: &str) -> Prompt {
    let numbered: String = source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4} | {}\n", i + 1, line))
        .collect();
    let user = format!(
        "{}\n## Current source (line numbers are for reference only, never include them in edits)\n```\n{}```\n\n\
         ## What to fix\n{}\n\nSubmit edits with `propose_edits`. `search` and `anchor` must be copied \
         exactly from the source and occur once.",
        spec_section(spec),
        numbered,
        feedback
    );
    Prompt::new(COMPONENT_AUTHOR, user)
}

/// One-shot spec plus component
pub fn custom_game(profile: &LearnerProfile, topic: Option<&str>) -> Prompt {
    let user = format!(
        "{}\n# Component\n{}\nDesign the game and write its component in one go; the design's kind is `custom`. \
         Submit both with `submit_custom_game`.",
        context(profile, topic),
        kind_section(GameKind::Custom)
    );
    Prompt::new(format!("{}\n\n{}", DESIGNER, COMPONENT_AUTHOR), user)
}

/// Critic call over a structurally valid candidate
pub fn critique(spec: &GameSpec, config: &RendererConfig) -> Prompt {
    let artifact = match config {
        RendererConfig::Custom(component) => format!("## Component source\n```jsx\n{}\n```", component.source),
        other => format!(
            "## Config\n{}",
            json_block(&serde_json::to_value(other).unwrap_or(Value::Null))
        ),
    };
    let rubric: String = DIMENSIONS.iter().map(|d| format!("- {}\n", d)).collect();
    let user = format!(
        "{}\n{}\n\n## Rubric\n{}\nA game passes when no dimension is below 2 and the total is at least 10. \
         Submit scores with `submit_critique`.",
        spec_section(spec),
        artifact,
        rubric
    );
    Prompt::new(CRITIC, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> GameSpec {
        GameSpec::from_value(&json!({
            "title": "Lever Lab",
            "kind": "bucket_sort",
            "rationale": { "concept": "lever classes" },
            "rounds": [{ "focus": "first class levers" }]
        }))
        .unwrap()
    }

    #[test]
    fn test_design_mentions_forced_kind() {
        let profile = LearnerProfile::new("Ada", "physics");
        let prompt = design(&profile, Some("levers"), Some(GameKind::Timeline));
        assert!(prompt.user.contains("## Topic\nlevers"));
        assert!(prompt.user.contains("must use the `timeline` renderer"));
        assert_eq!(prompt.into_messages().len(), 2);
    }

    #[test]
    fn test_build_quotes_catalog_entry() {
        let prompt = build_config(&LearnerProfile::new("Ada", "physics"), &spec());
        assert!(prompt.user.contains("## bucket_sort"));
        assert!(prompt.user.contains("Lever Lab"));
    }

    #[test]
    fn test_component_revision_numbers_lines() {
        let prompt = revise_component(&spec(), "function Game() {\n  return null;\n}\n", "render: boom");
        assert!(prompt.user.contains("   2 |   return null;"));
        assert!(prompt.user.contains("render: boom"));
    }
}
