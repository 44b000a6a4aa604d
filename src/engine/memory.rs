// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Side-effect free [`StackContext`].
//!
//! Declarations and outputs are recorded in memory; the only thing that reaches the
//! outside world is the device registry query. `plan` runs the program against this
//! context and diffs the result against recorded state.

use super::graph::{DeclareOptions, Graph, Resource, ResourceHandle, StackContext};
use crate::errors::EngineError;
use crate::tailscale::{Device, DeviceRegistry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Records a program's declarations without realizing them.
pub struct RecordingContext {
    graph: Graph,
    outputs: BTreeMap<String, Value>,
    registry: Arc<dyn DeviceRegistry>,
}

impl RecordingContext {
    #[must_use]
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            graph: Graph::new(),
            outputs: BTreeMap::new(),
            registry,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    /// Consume the context, returning the recorded graph and outputs.
    #[must_use]
    pub fn into_parts(self) -> (Graph, BTreeMap<String, Value>) {
        (self.graph, self.outputs)
    }
}

#[async_trait::async_trait]
impl StackContext for RecordingContext {
    async fn declare(
        &mut self,
        name: &str,
        resource: Resource,
        options: DeclareOptions,
    ) -> Result<ResourceHandle, EngineError> {
        let declaration = self.graph.record(name, resource, options)?;
        debug!(urn = %declaration.handle, "Recorded declaration");
        Ok(declaration.handle.clone())
    }

    fn export(&mut self, key: &str, value: Value) {
        self.outputs.insert(key.to_string(), value);
    }

    async fn devices(&self, name_prefix: &str) -> Result<Vec<Device>, EngineError> {
        Ok(self.registry.list_devices(name_prefix).await?)
    }
}
