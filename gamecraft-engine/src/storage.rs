//! # Storage
//!
//! Key-value persistence for run artifacts. Each key is one JSON document;
//! the trace recorder stores one document per run under its run id.

use crate::error::{self, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where run documents go. Writes replace the previous document under the
/// same key.
pub trait StorageBackend: Send + Sync {
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// In-memory storage. Clones share the same map, so a test can keep a handle
/// while the recorder owns the backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().ok()?.get(key).cloned()
    }
}

impl StorageBackend for MemoryStorage {
    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| error::storage_failed("memory storage lock poisoned"))?;
        data.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-based storage: `<base>/<key>.json`, pretty-printed
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            error::io_error(format!("failed to create storage dir {}: {}", base_path.display(), e))
        })?;
        Ok(Self { base_path })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        // Sanitize key for use as filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.base_path.join(format!("{}.json", safe_key))
    }
}

impl StorageBackend for FileStorage {
    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key);
        let content =
            serde_json::to_string_pretty(&value).map_err(|e| error::serialization_error(e.to_string()))?;
        std::fs::write(&path, content)
            .map_err(|e| error::io_error(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }
}
