//! Remembering mappings between sessions
//!
//! A mapping is stored under a key built from the input headers and the
//! template file name, so reopening the same pair of files recalls it.
//! Recall is a convenience: every storage failure is logged and treated as
//! a miss.

use super::{ColumnMapping, MappingStore};
use crate::error::{SheetfillError, SheetfillResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// String key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> SheetfillResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> SheetfillResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SheetfillResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> SheetfillResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk, one member per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> SheetfillResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SheetfillError::Config(format!(
                "{}: expected a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(SheetfillError::Config(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> SheetfillResult<Option<String>> {
        Ok(self.load()?.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set(&mut self, key: &str, value: &str) -> SheetfillResult<()> {
        // A corrupt file is replaced rather than blocking new entries.
        let mut map = self.load().unwrap_or_else(|err| {
            warn!(error = %err, "discarding unreadable mapping store");
            Map::new()
        });
        map.insert(key.to_string(), Value::String(value.to_string()));
        let json = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| SheetfillError::Config(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Mapping recall on top of any [`KeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct MappingMemory<S> {
    store: S,
}

impl<S: KeyValueStore> MappingMemory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn storage_key(headers: &[String], template_name: &str) -> String {
        format!(
            "excel-mapping-input-{}-template-{}",
            headers.join("-"),
            template_name
        )
    }

    /// Previously remembered mappings for this headers/template pair.
    ///
    /// Entries naming a column that is no longer in `headers`, or without a
    /// string target, are dropped. Nothing left counts as a miss.
    pub fn recall(&self, headers: &[String], template_name: &str) -> Option<MappingStore> {
        let key = Self::storage_key(headers, template_name);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "no remembered mappings");
                return None;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "mapping recall failed");
                return None;
            }
        };

        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) | Err(_) => {
                warn!(key = %key, "ignoring malformed remembered mappings");
                return None;
            }
        };

        let store: MappingStore = entries
            .iter()
            .filter_map(|entry| {
                let source = entry.get("sourceColumn")?.as_str()?;
                let target = entry.get("targetCell")?.as_str()?;
                headers
                    .iter()
                    .any(|h| h == source)
                    .then(|| ColumnMapping::new(source, target))
            })
            .collect();

        (!store.is_empty()).then_some(store)
    }

    /// Remember `mappings` for this headers/template pair. Failures are logged.
    pub fn remember(&mut self, headers: &[String], template_name: &str, mappings: &MappingStore) {
        let key = Self::storage_key(headers, template_name);
        let result = serde_json::to_string(mappings)
            .map_err(|e| SheetfillError::Config(e.to_string()))
            .and_then(|json| self.store.set(&key, &json));
        match result {
            Ok(()) => debug!(key = %key, mappings = mappings.len(), "remembered mappings"),
            Err(err) => warn!(key = %key, error = %err, "could not remember mappings"),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
