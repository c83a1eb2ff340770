//! Structured log events for the run lifecycle.
//!
//! Everything is emitted at `info!` inside a `gamecraft.run` span carrying
//! the run id; filter with `RUST_LOG=gamecraft_pipeline=debug` for more.

use tracing::{info, Span};

/// Span that scopes every log line of one run
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("gamecraft.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, learner: &str, topic: Option<&str>, force_custom: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        learner = %learner,
        topic = topic.unwrap_or("-"),
        force_custom = force_custom,
    );
}

pub fn emit_spec_ready(title: &str, kind: &str, rounds: usize) {
    info!(event = "spec.ready", title = %title, kind = %kind, rounds = rounds);
}

pub fn emit_model_call(operation: &str, model: &str, total_tokens: usize) {
    info!(event = "model.call", operation = %operation, model = %model, total_tokens = total_tokens);
}

pub fn emit_validation_failed(iteration: u32, violations: usize) {
    info!(event = "candidate.invalid", iteration = iteration, violations = violations);
}

pub fn emit_critic_scored(iteration: u32, total: u8, passed: bool) {
    info!(event = "critic.scored", iteration = iteration, total = total, passed = passed);
}

pub fn emit_critic_unusable(iteration: u32, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "critic.unusable", iteration = iteration, error = %error);
}

pub fn emit_revision(iteration: u32, summary: &str) {
    info!(event = "candidate.revised", iteration = iteration, summary = %summary);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, outcome: &str, critic_calls: u32) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        outcome = %outcome,
        critic_calls = critic_calls,
    );
}

pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.failed", run_id = %run_id, error = %error);
}

/// The run failed after a valid candidate was found and ships that instead
pub fn emit_run_degraded(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.degraded", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_without_subscriber() {
        let _guard = run_span("run-1").entered();
        emit_run_started("run-1", "Ada", None, false);
        emit_critic_scored(1, 9, false);
        emit_critic_unusable(2, &"no JSON object");
        emit_run_finished("run-1", 12, "complete", 1);
    }
}
