// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # tsk - Tailscale DNS forwarder for Kubernetes
//!
//! tsk deploys an ephemeral node into a Kubernetes namespace that joins a Tailscale
//! tailnet, advertises the cluster's service CIDR as a subnet route, and registers itself
//! as the tailnet's nameserver so peers can resolve `<service>.tsk` to cluster services.
//!
//! ## Overview
//!
//! One `tsk up` is a single reconciliation pass:
//!
//! 1. the node's `ServiceAccount`, `Role`, `RoleBinding`, `Secret`, `ConfigMap` and
//!    `Deployment` are declared as a tree rooted at the `ServiceAccount`
//! 2. the tailnet device registry is queried for `<hostname>.<tailnet>`
//! 3. once the device is registered, subnet routes, nameservers and search paths are
//!    declared in that order, and the `dnsConfigured` output reports the result
//!
//! ## Modules
//!
//! - [`config`] - validated configuration record
//! - [`template`] - Corefile rendering
//! - [`resources`] - Kubernetes resource builders and node declaration
//! - [`dns`] - device matching and tailnet DNS reconciliation
//! - [`program`] - the stack program combining both
//! - [`stack`] - stack session facade (`up`, `preview`, `refresh`, `destroy`, `export`)
//! - [`engine`] - declarative engine: graph, state backend, providers
//! - [`tailscale`] - Tailscale API client and provider
//!
//! ## Example
//!
//! ```rust,no_run
//! use tsk::config::Settings;
//! use tsk::stack::get_stack;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Settings {
//!     storage_dir: "/home/alice/.tsk".into(),
//!     ephemeral_key: "tskey-auth-xxx".into(),
//!     api_key: "tskey-api-xxx".into(),
//!     tailnet: "example.ts.net".into(),
//!     hostname: "node1".into(),
//!     username: "alice".into(),
//!     namespace: "default".into(),
//!     service_cidr: "10.96.0.0/12".into(),
//! }
//! .validate()?;
//!
//! let result = get_stack(&config).await?.up().await?;
//! println!("DNS configured: {}", result.dns_configured());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dns;
pub mod engine;
pub mod errors;
pub mod labels;
pub mod program;
pub mod resources;
pub mod stack;
pub mod tailscale;
pub mod template;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod dns_tests;
