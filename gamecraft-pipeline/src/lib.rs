//! # gamecraft pipeline
//!
//! Turns a learner profile into a playable exercise:
//! 1. The model designs a game spec for the learner
//! 2. The model builds a renderer config (or a JSX component) for it
//! 3. The validator or the sandbox checks the candidate structurally
//! 4. The critic scores valid candidates against a fixed rubric
//! 5. Failures feed back into a revision until the budget runs out
//!
//! Progress is a stream of [`PipelineEvent`]s that always ends in exactly
//! one `complete` or `error`.

mod config;
mod critic;
mod events;
mod obs;
mod orchestrator;
mod profile;
mod prompts;
mod tools;

pub use config::{PipelineConfig, MAX_ITERATIONS};
pub use critic::{Critic, CriticDimension, CriticResult, DIMENSIONS};
pub use events::PipelineEvent;
pub use orchestrator::{GenerationRequest, Pipeline};
pub use profile::{LearnerProfile, PerformanceRecord};
pub use tools::extract_json;
