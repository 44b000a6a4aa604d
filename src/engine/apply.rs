// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Realizing operations: `up`, `refresh` and `destroy`.
//!
//! Each operation mutates the [`StackState`] it is given as it goes. When an operation
//! fails halfway, the state still describes exactly what was realized, so the caller
//! should persist it whether or not the operation succeeded.
//!
//! `up` and `destroy` also accept a checkpoint backend. The state is saved there after
//! every realized or deleted resource, so an interrupted operation (a dropped future,
//! Ctrl-C) still leaves every live object recorded.

use super::diff::{classify, Operation};
use super::graph::{DeclareOptions, Graph, Program, Resource, ResourceHandle, StackContext};
use super::provider::{Plugins, Providers};
use super::state::{FileBackend, StackState, StateEntry};
use crate::errors::EngineError;
use crate::tailscale::Device;
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Counts of what an operation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub same: usize,
}

impl ChangeSummary {
    fn record(&mut self, op: Operation) {
        match op {
            Operation::Same => self.same += 1,
            Operation::Create => self.created += 1,
            Operation::Update => self.updated += 1,
            Operation::Replace => self.replaced += 1,
            Operation::Delete => self.deleted += 1,
        }
    }

    /// Number of resources that were touched.
    #[must_use]
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes() == 0 {
            return write!(f, "no changes ({} unchanged)", self.same);
        }
        let parts: Vec<String> = [
            (self.created, "created"),
            (self.updated, "updated"),
            (self.replaced, "replaced"),
            (self.deleted, "deleted"),
            (self.same, "unchanged"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Outcome of a successful `up`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpResult {
    pub outputs: BTreeMap<String, Value>,
    pub summary: ChangeSummary,
}

/// Context that realizes each declaration as soon as it is made.
struct ApplyContext<'a> {
    graph: Graph,
    /// State as it was before this run
    base: StackState,
    realized: Vec<StateEntry>,
    outputs: BTreeMap<String, Value>,
    providers: &'a Providers,
    plugins: &'a Plugins,
    checkpoint: Option<&'a FileBackend>,
    summary: ChangeSummary,
}

impl ApplyContext<'_> {
    fn previous(&self, urn: &str) -> Option<&StateEntry> {
        self.base.entry(urn)
    }

    /// Previously recorded entries this run has not declared (yet).
    fn untouched(&self) -> Vec<StateEntry> {
        let declared: HashSet<&str> = self.realized.iter().map(|e| e.urn.as_str()).collect();
        self.base
            .resources
            .iter()
            .filter(|e| !declared.contains(e.urn.as_str()))
            .cloned()
            .collect()
    }

    /// Realized entries followed by the untouched previous ones.
    fn merged_resources(&self) -> Vec<StateEntry> {
        let mut resources = self.realized.clone();
        resources.extend(self.untouched());
        resources
    }

    async fn save_checkpoint(&self) -> Result<(), EngineError> {
        let Some(backend) = self.checkpoint else {
            return Ok(());
        };
        let mut snapshot = self.base.clone();
        snapshot.resources = self.merged_resources();
        snapshot.plugins = self.plugins.versions().clone();
        snapshot.updated_at = Some(Utc::now());
        backend.save(&snapshot).await
    }

    async fn realize(
        &self,
        urn: &str,
        op: Operation,
        resource: &Resource,
        previous: Option<&StateEntry>,
        delete_before_replace: bool,
    ) -> Result<String, EngineError> {
        let provider = self.providers.for_kind(resource.kind());
        let wrap = |operation: &'static str| {
            let urn = urn.to_string();
            move |source: anyhow::Error| EngineError::Provider {
                operation,
                urn,
                source,
            }
        };

        match (op, previous) {
            (Operation::Same, Some(previous)) => Ok(previous.id.clone()),
            (Operation::Update, Some(previous)) => provider
                .update(&previous.id, resource)
                .await
                .map_err(wrap("update")),
            (Operation::Replace, Some(previous)) if delete_before_replace => {
                provider.delete(previous).await.map_err(wrap("delete"))?;
                provider.create(resource).await.map_err(wrap("create"))
            }
            (Operation::Replace, Some(previous)) => {
                let id = provider.create(resource).await.map_err(wrap("create"))?;
                provider.delete(previous).await.map_err(wrap("delete"))?;
                Ok(id)
            }
            _ => provider.create(resource).await.map_err(wrap("create")),
        }
    }
}

#[async_trait::async_trait]
impl StackContext for ApplyContext<'_> {
    async fn declare(
        &mut self,
        name: &str,
        resource: Resource,
        options: DeclareOptions,
    ) -> Result<ResourceHandle, EngineError> {
        self.plugins.require(resource.kind())?;
        let declaration = self.graph.record(name, resource, options)?.clone();
        let urn = declaration.handle.urn();

        let inputs = declaration
            .resource
            .inputs()
            .map_err(|source| EngineError::Inputs {
                urn: urn.clone(),
                source,
            })?;

        let previous = self.previous(&urn).cloned();
        let op = classify(previous.as_ref(), &declaration.resource, &inputs);
        debug!(urn = %urn, op = %op, "Realizing declaration");

        let id = self
            .realize(
                &urn,
                op,
                &declaration.resource,
                previous.as_ref(),
                declaration.options.delete_before_replace,
            )
            .await?;

        if op != Operation::Same {
            info!(urn = %urn, id = %id, op = %op, "Resource realized");
        }
        self.summary.record(op);
        self.realized.push(StateEntry {
            urn,
            kind: declaration.handle.kind,
            name: declaration.handle.name.clone(),
            id,
            parent: declaration.parent_urn(),
            dependencies: declaration.dependency_urns(),
            delete_before_replace: declaration.options.delete_before_replace,
            inputs,
        });

        if op != Operation::Same {
            self.save_checkpoint().await?;
        }

        Ok(declaration.handle)
    }

    fn export(&mut self, key: &str, value: Value) {
        self.outputs.insert(key.to_string(), value);
    }

    async fn devices(&self, name_prefix: &str) -> Result<Vec<Device>, EngineError> {
        Ok(self.providers.registry.list_devices(name_prefix).await?)
    }
}

/// Delete entries in reverse order, removing each from `state` once it is gone and
/// saving `state` to `checkpoint` after every deletion.
async fn delete_entries(
    state: &mut StackState,
    doomed: &[String],
    providers: &Providers,
    plugins: &Plugins,
    checkpoint: Option<&FileBackend>,
) -> Result<usize, EngineError> {
    let mut deleted = 0;
    for urn in doomed.iter().rev() {
        let Some(index) = state.resources.iter().position(|e| &e.urn == urn) else {
            continue;
        };
        let entry = &state.resources[index];
        plugins.require(entry.kind)?;
        providers
            .for_kind(entry.kind)
            .delete(entry)
            .await
            .map_err(|source| EngineError::Provider {
                operation: "delete",
                urn: urn.clone(),
                source,
            })?;
        info!(urn = %urn, "Resource deleted");
        state.resources.remove(index);
        deleted += 1;

        if let Some(backend) = checkpoint {
            state.updated_at = Some(Utc::now());
            backend.save(state).await?;
        }
    }
    Ok(deleted)
}

/// Run `program` and realize its declarations, then delete what it no longer declares.
///
/// # Errors
///
/// Returns the first program, provider or backend error. Resources realized before the
/// failure are recorded in `state`; previously recorded resources that were not reached
/// are kept, and the previous outputs are left untouched. With a `checkpoint` backend
/// the same holds for the saved state at every point of the run.
pub async fn up(
    state: &mut StackState,
    program: &dyn Program,
    providers: &Providers,
    plugins: &Plugins,
    checkpoint: Option<&FileBackend>,
) -> Result<UpResult> {
    let mut ctx = ApplyContext {
        graph: Graph::new(),
        base: state.clone(),
        realized: Vec::new(),
        outputs: BTreeMap::new(),
        providers,
        plugins,
        checkpoint,
        summary: ChangeSummary::default(),
    };

    let outcome = program.run(&mut ctx).await;

    let untouched = ctx.untouched();
    state.resources = ctx.merged_resources();
    state.plugins = plugins.versions().clone();
    state.updated_at = Some(Utc::now());

    if let Err(e) = outcome {
        warn!(
            realized = ctx.realized.len(),
            kept = untouched.len(),
            "Update failed before completion: {e:#}"
        );
        return Err(e);
    }

    let stale: Vec<String> = untouched.iter().map(|e| e.urn.clone()).collect();
    let mut summary = ctx.summary;
    summary.deleted += delete_entries(state, &stale, providers, plugins, checkpoint).await?;

    state.outputs = ctx.outputs.clone();
    info!(summary = %summary, "Update complete");

    Ok(UpResult {
        outputs: ctx.outputs,
        summary,
    })
}

/// Reconcile recorded state with what actually exists.
///
/// Resources that no longer exist are dropped from state; resources whose live shape
/// differs have their recorded inputs updated.
///
/// # Errors
///
/// Returns the first provider error. Entries refreshed before it are kept.
pub async fn refresh(
    state: &mut StackState,
    providers: &Providers,
    plugins: &Plugins,
) -> Result<ChangeSummary> {
    let mut summary = ChangeSummary::default();
    let mut kept = Vec::with_capacity(state.resources.len());
    let entries = std::mem::take(&mut state.resources);
    let mut remaining = entries.into_iter();

    while let Some(mut entry) = remaining.next() {
        let live = match plugins.require(entry.kind) {
            Ok(()) => providers
                .for_kind(entry.kind)
                .read(&entry)
                .await
                .map_err(|source| EngineError::Provider {
                    operation: "read",
                    urn: entry.urn.clone(),
                    source,
                }),
            Err(e) => Err(e),
        };

        let live = match live {
            Ok(live) => live,
            Err(e) => {
                kept.push(entry);
                kept.extend(remaining);
                state.resources = kept;
                return Err(e.into());
            }
        };

        match live {
            None => {
                info!(urn = %entry.urn, "Resource no longer exists, dropping it from state");
                summary.record(Operation::Delete);
            }
            Some(inputs) if inputs != entry.inputs => {
                info!(urn = %entry.urn, "Resource drifted, recording live inputs");
                entry.inputs = inputs;
                summary.record(Operation::Update);
                kept.push(entry);
            }
            Some(_) => {
                summary.record(Operation::Same);
                kept.push(entry);
            }
        }
    }

    state.resources = kept;
    state.updated_at = Some(Utc::now());
    info!(summary = %summary, "Refresh complete");
    Ok(summary)
}

/// Delete every recorded resource, children before parents.
///
/// # Errors
///
/// Returns the first provider error. Resources not yet deleted stay in state.
pub async fn destroy(
    state: &mut StackState,
    providers: &Providers,
    plugins: &Plugins,
    checkpoint: Option<&FileBackend>,
) -> Result<ChangeSummary> {
    let doomed: Vec<String> = state.resources.iter().map(|e| e.urn.clone()).collect();
    let deleted = delete_entries(state, &doomed, providers, plugins, checkpoint).await?;

    state.outputs.clear();
    state.updated_at = Some(Utc::now());

    let summary = ChangeSummary {
        deleted,
        ..Default::default()
    };
    info!(summary = %summary, "Destroy complete");
    Ok(summary)
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod apply_tests;
