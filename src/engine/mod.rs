// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Declarative engine.
//!
//! A [`Program`] declares the desired resources through a [`StackContext`]. The engine
//! compares those declarations with the state recorded by the [`FileBackend`] and
//! drives [`Provider`]s to converge:
//!
//! - [`graph`] - resources, handles, declaration options and the context traits
//! - [`memory`] - side-effect free context used for planning and tests
//! - [`diff`] - classification of declarations against recorded state
//! - [`apply`] - `up`, `refresh` and `destroy`
//! - [`preview`] - dry-run planning
//! - [`provider`] - provider trait, plugin registry and the Kubernetes provider
//! - [`state`] - recorded state and its `file://` backend

pub mod apply;
pub mod diff;
pub mod graph;
pub mod memory;
pub mod preview;
pub mod provider;
pub mod state;

pub use apply::{destroy, refresh, up, ChangeSummary, UpResult};
pub use diff::Operation;
pub use graph::{
    DeclareOptions, Declaration, Graph, Program, Resource, ResourceHandle, ResourceKind,
    StackContext,
};
pub use memory::RecordingContext;
pub use preview::{preview, Plan, PlanStep};
pub use provider::{KubernetesProvider, Plugins, Provider, Providers};
pub use state::{FileBackend, StackState, StateEntry};
