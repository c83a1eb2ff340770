//! Progress events streamed out of a run

use crate::critic::CriticResult;
use gamecraft_engine::{GameSpec, RendererConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of progress. A run's stream ends with exactly one
/// [`PipelineEvent::Complete`] or [`PipelineEvent::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    SpecReady {
        spec: GameSpec,
    },
    ConfigDraft {
        iteration: u32,
        candidate: Value,
    },
    ValidationError {
        iteration: u32,
        errors: Vec<String>,
    },
    CriticResult {
        iteration: u32,
        result: CriticResult,
    },
    Revision {
        iteration: u32,
        summary: String,
    },
    Complete {
        spec: GameSpec,
        config: RendererConfig,
        /// Critic total; absent when no critic ran
        score: Option<u8>,
        /// Budget ran out and this is the best valid candidate seen
        best_effort: bool,
    },
    Error {
        message: String,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::SpecReady { .. } => "spec_ready",
            PipelineEvent::ConfigDraft { .. } => "config_draft",
            PipelineEvent::ValidationError { .. } => "validation_error",
            PipelineEvent::CriticResult { .. } => "critic_result",
            PipelineEvent::Revision { .. } => "revision",
            PipelineEvent::Complete { .. } => "complete",
            PipelineEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Complete { .. } | PipelineEvent::Error { .. })
    }

    pub fn iteration(&self) -> Option<u32> {
        match self {
            PipelineEvent::ConfigDraft { iteration, .. }
            | PipelineEvent::ValidationError { iteration, .. }
            | PipelineEvent::CriticResult { iteration, .. }
            | PipelineEvent::Revision { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = PipelineEvent::ValidationError {
            iteration: 2,
            errors: vec!["round 1: prompt is empty".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "validation_error");
        assert_eq!(json["iteration"], 2);
        assert_eq!(event.name(), "validation_error");
        assert!(!event.is_terminal());

        let event = PipelineEvent::Error { message: "boom".into() };
        assert!(event.is_terminal());
        assert_eq!(event.iteration(), None);
    }
}
