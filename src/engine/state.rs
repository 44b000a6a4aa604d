// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Recorded stack state and the `file://` backend that persists it.
//!
//! State lives at `<storage dir>/.tsk/stacks/<project>/<stack>.json`. Writes go to a
//! temporary file that is renamed into place, so a crash never leaves a torn file.

use super::graph::ResourceKind;
use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Current state file format version
pub const STATE_VERSION: u32 = 1;

/// One realized resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub urn: String,
    pub kind: ResourceKind,
    /// Logical declaration name
    pub name: String,
    /// Provider id of the realized object
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub delete_before_replace: bool,
    pub inputs: Value,
}

/// Everything recorded for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackState {
    pub version: u32,
    pub project: String,
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Provider plugin versions the state was last written with
    #[serde(default)]
    pub plugins: BTreeMap<String, String>,
    /// Resources in declaration order (parents before children)
    #[serde(default)]
    pub resources: Vec<StateEntry>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl StackState {
    #[must_use]
    pub fn new(project: &str, stack: &str) -> Self {
        Self {
            version: STATE_VERSION,
            project: project.to_string(),
            stack: stack.to_string(),
            updated_at: None,
            plugins: BTreeMap::new(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Look up a recorded resource by URN.
    #[must_use]
    pub fn entry(&self, urn: &str) -> Option<&StateEntry> {
        self.resources.iter().find(|e| e.urn == urn)
    }

    /// Pretty JSON rendering, as shown by `tsk stack`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// State backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open the backend behind a `file://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedBackend`] for any other scheme.
    pub fn from_url(url: &Url) -> Result<Self, EngineError> {
        if url.scheme() != "file" {
            return Err(EngineError::UnsupportedBackend(url.to_string()));
        }
        let root = url
            .to_file_path()
            .map_err(|()| EngineError::UnsupportedBackend(url.to_string()))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the state file for a stack.
    #[must_use]
    pub fn state_path(&self, project: &str, stack: &str) -> PathBuf {
        self.root
            .join(".tsk")
            .join("stacks")
            .join(project)
            .join(format!("{stack}.json"))
    }

    /// Load a stack's state, or `None` if it has never been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(
        &self,
        project: &str,
        stack: &str,
    ) -> Result<Option<StackState>, EngineError> {
        let path = self.state_path(project, stack);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EngineError::StateIo {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let state = serde_json::from_slice(&bytes).map_err(|source| EngineError::StateFormat {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded stack state");
        Ok(Some(state))
    }

    /// Persist a stack's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    pub async fn save(&self, state: &StackState) -> Result<(), EngineError> {
        let path = self.state_path(&state.project, &state.stack);
        let io_err = |source| EngineError::StateIo {
            path: path.display().to_string(),
            source,
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let json = state
            .to_pretty_json()
            .map_err(|source| EngineError::StateFormat {
                path: path.display().to_string(),
                source,
            })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!(
            path = %path.display(),
            resources = state.resources.len(),
            "Saved stack state"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
