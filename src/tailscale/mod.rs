// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tailscale control-plane integration.
//!
//! - [`client`] - thin HTTP client over the Tailscale v2 API
//! - [`provider`] - engine provider realizing subnet routes and tailnet DNS settings
//! - [`types`] - device records and the declarable Tailscale resources

pub mod client;
pub mod provider;
pub mod types;

pub use client::TailscaleClient;
pub use provider::TailscaleProvider;
pub use types::{Device, DeviceSubnetRoutes, DnsNameservers, DnsSearchPaths};

use crate::errors::MeshError;

/// Read access to the tailnet device registry.
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// List devices whose name starts with `name_prefix`, in registry order.
    async fn list_devices(&self, name_prefix: &str) -> Result<Vec<Device>, MeshError>;
}
