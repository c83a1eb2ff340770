//! Pipeline configuration

use std::path::PathBuf;

/// Ceiling on build attempts per run, whatever the configuration asks for
pub const MAX_ITERATIONS: u32 = 3;

/// Configuration for a pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Build attempts per run, initial build included. Structural and
    /// quality failures draw from the same budget. Read through
    /// [`PipelineConfig::iteration_budget`], which keeps it in 1..=3.
    pub max_iterations: u32,
    /// Where trace files go; `None` keeps traces in memory only
    pub trace_dir: Option<PathBuf>,
    /// Overrides the provider's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: usize,
    /// Upper bound for one model call, on top of the HTTP client timeout
    pub call_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            trace_dir: None,
            model: None,
            temperature: Some(0.7),
            max_tokens: 8192,
            call_timeout_secs: 180,
        }
    }
}

impl PipelineConfig {
    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.clamp(1, MAX_ITERATIONS);
        self
    }

    /// Attempts a run may actually make
    pub fn iteration_budget(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_budget_is_capped() {
        assert_eq!(PipelineConfig::default().iteration_budget(), 3);
        assert_eq!(PipelineConfig::default().with_max_iterations(10).max_iterations, 3);
        assert_eq!(PipelineConfig::default().with_max_iterations(0).iteration_budget(), 1);

        let config = PipelineConfig {
            max_iterations: 50,
            ..PipelineConfig::default()
        };
        assert_eq!(config.iteration_budget(), 3);
    }
}
