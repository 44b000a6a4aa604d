// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dry-run planning.
//!
//! The program runs against a [`RecordingContext`] and its declarations are
//! classified against recorded state. Nothing is created, changed or deleted.

use super::diff::{changed_paths, classify, Operation};
use super::graph::Program;
use super::memory::RecordingContext;
use super::provider::Plugins;
use super::state::StackState;
use crate::errors::EngineError;
use crate::tailscale::DeviceRegistry;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub op: Operation,
    pub urn: String,
    /// Paths of changed inputs, filled for updates and replacements in verbose mode
    pub changed_paths: Vec<String>,
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub outputs: BTreeMap<String, Value>,
}

impl Plan {
    /// Number of steps of the given kind.
    #[must_use]
    pub fn count(&self, op: Operation) -> usize {
        self.steps.iter().filter(|s| s.op == op).count()
    }

    /// Whether applying the plan would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.op != Operation::Same)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "  {} {:<8} {}", step.op.symbol(), step.op, step.urn)?;
            for path in &step.changed_paths {
                writeln!(f, "        ~ {path}")?;
            }
        }

        if !self.outputs.is_empty() {
            writeln!(f, "Outputs:")?;
            for (key, value) in &self.outputs {
                writeln!(f, "  {key}: {value}")?;
            }
        }

        if self.has_changes() {
            write!(
                f,
                "Plan: {} to create, {} to update, {} to replace, {} to delete",
                self.count(Operation::Create),
                self.count(Operation::Update),
                self.count(Operation::Replace),
                self.count(Operation::Delete)
            )
        } else {
            write!(f, "No changes, {} resources unchanged", self.count(Operation::Same))
        }
    }
}

/// Run `program` without side effects and describe what `up` would do.
///
/// # Errors
///
/// Returns an error if the program fails, a plugin is missing or inputs cannot be
/// serialized.
pub async fn preview(
    program: &dyn Program,
    state: &StackState,
    registry: Arc<dyn DeviceRegistry>,
    plugins: &Plugins,
    verbose: bool,
) -> Result<Plan> {
    let mut ctx = RecordingContext::new(registry);
    program.run(&mut ctx).await?;
    let (graph, outputs) = ctx.into_parts();

    let mut steps = Vec::with_capacity(graph.len());
    for declaration in graph.declarations() {
        plugins.require(declaration.handle.kind)?;
        let urn = declaration.handle.urn();
        let inputs = declaration
            .resource
            .inputs()
            .map_err(|source| EngineError::Inputs {
                urn: urn.clone(),
                source,
            })?;

        let previous = state.entry(&urn);
        let op = classify(previous, &declaration.resource, &inputs);
        let changed = match (op, previous, verbose) {
            (Operation::Update | Operation::Replace, Some(previous), true) => {
                changed_paths(&previous.inputs, &inputs)
            }
            _ => Vec::new(),
        };

        debug!(urn = %urn, op = %op, "Planned step");
        steps.push(PlanStep {
            op,
            urn,
            changed_paths: changed,
        });
    }

    for entry in state.resources.iter().rev() {
        if !graph.contains(&entry.urn) {
            steps.push(PlanStep {
                op: Operation::Delete,
                urn: entry.urn.clone(),
                changed_paths: Vec::new(),
            });
        }
    }

    Ok(Plan { steps, outputs })
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod preview_tests;
