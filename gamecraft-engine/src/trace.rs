//! # Trace Recorder
//!
//! Observes a run without taking part in it. Every public method is
//! infallible: storage problems are logged and swallowed, so a broken trace
//! directory can never fail a generation.

use crate::provider::{Usage, UsageTracker};
use crate::storage::StorageBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// Time since the previous step (or the start of the run)
    pub duration_ms: u64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub run_id: String,
    pub status: TraceStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub steps: Vec<TraceStep>,
    #[serde(default)]
    pub usage: UsageTracker,
}

pub struct TraceRecorder {
    record: TraceRecord,
    backend: Box<dyn StorageBackend>,
    last_step: Instant,
}

impl TraceRecorder {
    pub fn new(run_id: impl Into<String>, backend: Box<dyn StorageBackend>) -> Self {
        let mut recorder = Self {
            record: TraceRecord {
                run_id: run_id.into(),
                status: TraceStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                metadata: Map::new(),
                steps: Vec::new(),
                usage: UsageTracker::new(),
            },
            backend,
            last_step: Instant::now(),
        };
        recorder.flush();
        recorder
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Serialize) {
        self.record.metadata.insert(key.into(), to_value(value));
        self.flush();
    }

    /// Append a step and flush
    pub fn step(&mut self, name: impl Into<String>, iteration: Option<u32>, payload: impl Serialize) {
        let now = Instant::now();
        let duration_ms = now.duration_since(self.last_step).as_millis() as u64;
        self.last_step = now;

        self.record.steps.push(TraceStep {
            name: name.into(),
            iteration,
            timestamp: Utc::now(),
            duration_ms,
            payload: to_value(payload),
        });
        self.flush();
    }

    pub fn error(&mut self, iteration: Option<u32>, message: &str) {
        self.step("error", iteration, serde_json::json!({ "message": message }));
    }

    pub fn track_usage(&mut self, model: &str, usage: &Usage) {
        self.record.usage.track(model, usage);
    }

    /// Set the terminal status. Later calls are ignored.
    pub fn finish(&mut self, status: TraceStatus) {
        if self.record.status != TraceStatus::Running {
            return;
        }
        self.record.status = status;
        self.record.finished_at = Some(Utc::now());
        self.flush();
    }

    fn flush(&mut self) {
        let value = match serde_json::to_value(&self.record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(event = "trace_flush_failed", run_id = %self.record.run_id, error = %e);
                return;
            }
        };
        if let Err(e) = self.backend.set(&self.record.run_id, value) {
            tracing::warn!(event = "trace_flush_failed", run_id = %self.record.run_id, error = %e);
        }
    }
}

impl Drop for TraceRecorder {
    fn drop(&mut self) {
        if self.record.status == TraceStatus::Running {
            self.step("abandoned", None, Value::Null);
            self.finish(TraceStatus::Error);
        }
    }
}

fn to_value(payload: impl Serialize) -> Value {
    serde_json::to_value(payload).unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{self, Result};
    use crate::storage::{FileStorage, MemoryStorage};
    use serde_json::json;

    struct BrokenStorage;

    impl StorageBackend for BrokenStorage {
        fn set(&mut self, _key: &str, _value: Value) -> Result<()> {
            Err(error::storage_failed("disk full"))
        }
    }

    fn stored(storage: &MemoryStorage, run_id: &str) -> TraceRecord {
        serde_json::from_value(storage.get(run_id).unwrap()).unwrap()
    }

    #[test]
    fn test_steps_flush_as_they_happen() {
        let storage = MemoryStorage::new();
        let mut recorder = TraceRecorder::new("run-1", Box::new(storage.clone()));
        recorder.set_metadata("learner", "Ada");
        recorder.step("spec_ready", None, json!({ "title": "Levers" }));
        recorder.step("critic_result", Some(1), json!({ "total": 9 }));

        let record = stored(&storage, "run-1");
        assert_eq!(record.status, TraceStatus::Running);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[1].iteration, Some(1));
        assert_eq!(record.metadata["learner"], "Ada");

        recorder.finish(TraceStatus::Complete);
        recorder.finish(TraceStatus::Error);
        drop(recorder);

        let record = stored(&storage, "run-1");
        assert_eq!(record.status, TraceStatus::Complete);
        assert!(record.finished_at.is_some());
        assert_eq!(record.steps.len(), 2);
    }

    #[test]
    fn test_drop_finalizes_abandoned_run() {
        let storage = MemoryStorage::new();
        {
            let mut recorder = TraceRecorder::new("run-2", Box::new(storage.clone()));
            recorder.step("design", None, json!({}));
        }
        let record = stored(&storage, "run-2");
        assert_eq!(record.status, TraceStatus::Error);
        assert_eq!(record.steps.last().unwrap().name, "abandoned");
    }

    #[test]
    fn test_storage_errors_are_swallowed() {
        let mut recorder = TraceRecorder::new("run-3", Box::new(BrokenStorage));
        recorder.step("design", None, json!({}));
        recorder.error(Some(2), "model timed out");
        recorder.finish(TraceStatus::Error);
        assert_eq!(recorder.record.steps.len(), 2);
        assert_eq!(recorder.record.steps[1].name, "error");
        assert_eq!(recorder.record.steps[1].payload["message"], "model timed out");
    }

    #[test]
    fn test_file_backend_writes_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let mut recorder = TraceRecorder::new("run-4", Box::new(storage));
        recorder.track_usage("gpt-4o", &Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 });
        recorder.finish(TraceStatus::Complete);

        let text = std::fs::read_to_string(dir.path().join("run-4.json")).unwrap();
        let record: TraceRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(record.usage.total_tokens(), 15);
    }
}
