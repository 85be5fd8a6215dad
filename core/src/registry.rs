// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The process-wide mapping from task `type` to handler. This is the
//! security boundary of the system: a task whose type has no registered
//! handler must fail immediately, never fall back to dynamic import or
//! reflection.

use std::{collections::HashSet, path::Path, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::CoreError, handler::Handler};

/// One entry in a handler-registration config file (§6 of the spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerManifestEntry {
    #[serde(rename = "type")]
    pub task_type: String,
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The deserialized shape of a handler-registration config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerManifest {
    #[serde(default)]
    pub handlers: Vec<HandlerManifestEntry>,
}

impl HandlerManifest {
    /// Load a manifest from a JSON, YAML, or TOML file, dispatched by extension.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let manifest: HandlerManifest = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            other => {
                return Err(CoreError::UnsupportedManifestFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject manifests with more than one entry for the same task type
    /// before any task is allowed to claim against the registry.
    fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for entry in &self.handlers {
            if !seen.insert(entry.task_type.clone()) {
                return Err(CoreError::DuplicateManifestEntry(entry.task_type.clone()));
            }
        }
        Ok(())
    }
}

/// A process-wide, concurrently-readable table of registered handlers.
///
/// Mutated only at startup (registration); looked up on every claimed task.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Register a handler for `task_type`. Fails with [`CoreError::DuplicateHandler`]
    /// unless `override_existing` is set.
    pub fn register(
        &self,
        task_type: impl Into<String>,
        handler: Arc<dyn Handler>,
        override_existing: bool,
    ) -> Result<(), CoreError> {
        let task_type = task_type.into();
        if !override_existing && self.handlers.contains_key(&task_type) {
            return Err(CoreError::DuplicateHandler(task_type));
        }
        info!(task_type = %task_type, "registered task handler");
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    /// O(1) lookup. Returns `None` — never a fallback — when the type is unknown.
    pub fn lookup(&self, task_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(task_type).map(|entry| entry.clone())
    }

    pub fn types(&self) -> HashSet<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerFn, HandlerOutcome};

    fn noop_handler() -> Arc<dyn Handler> {
        Arc::new(HandlerFn::new(|_payload, _cancel| async move {
            HandlerOutcome::Success(b"{}".to_vec())
        }))
    }

    #[test]
    fn register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register("t.ok", noop_handler(), false).unwrap();
        assert!(registry.lookup("t.ok").is_some());
        assert!(registry.lookup("t.nosuch").is_none());
    }

    #[test]
    fn duplicate_registration_fails_without_override() {
        let registry = HandlerRegistry::new();
        registry.register("t.ok", noop_handler(), false).unwrap();
        let err = registry.register("t.ok", noop_handler(), false).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateHandler(_)));
        assert!(registry.register("t.ok", noop_handler(), true).is_ok());
    }

    #[test]
    fn manifest_rejects_duplicate_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handlers.json");
        std::fs::write(
            &path,
            r#"{"handlers":[
                {"type":"sources.youtube","module":"handlers.youtube","function":"handle"},
                {"type":"sources.youtube","module":"handlers.youtube2","function":"handle"}
            ]}"#,
        )
        .unwrap();

        let err = HandlerManifest::load_from_file(&path).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateManifestEntry(_)));
    }

    #[test]
    fn manifest_loads_json_yaml_toml() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("handlers.json");
        std::fs::write(
            &json,
            r#"{"handlers":[{"type":"sources.youtube","module":"handlers.youtube","function":"handle","version":"1.0.0"}]}"#,
        )
        .unwrap();
        let manifest = HandlerManifest::load_from_file(&json).unwrap();
        assert_eq!(manifest.handlers.len(), 1);
        assert_eq!(manifest.handlers[0].task_type, "sources.youtube");

        let yaml = dir.path().join("handlers.yaml");
        std::fs::write(
            &yaml,
            "handlers:\n  - type: sources.youtube\n    module: handlers.youtube\n    function: handle\n",
        )
        .unwrap();
        assert_eq!(HandlerManifest::load_from_file(&yaml).unwrap().handlers.len(), 1);

        let toml_path = dir.path().join("handlers.toml");
        std::fs::write(
            &toml_path,
            "[[handlers]]\ntype = \"sources.youtube\"\nmodule = \"handlers.youtube\"\nfunction = \"handle\"\n",
        )
        .unwrap();
        assert_eq!(HandlerManifest::load_from_file(&toml_path).unwrap().handlers.len(), 1);
    }
}
