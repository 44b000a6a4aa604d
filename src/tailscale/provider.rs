// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Engine provider for Tailscale control-plane settings.
//!
//! Subnet routes are identified by device id. Nameservers and search paths are
//! tailnet-wide, so their provider id is the tailnet name. Deleting any of them
//! clears the list.

use super::client::TailscaleClient;
use super::types::{Device, DeviceSubnetRoutes, DnsNameservers, DnsSearchPaths};
use super::DeviceRegistry;
use crate::engine::graph::{Resource, ResourceKind};
use crate::engine::provider::Provider;
use crate::engine::state::StateEntry;
use crate::errors::MeshError;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

/// Realizes [`DeviceSubnetRoutes`], [`DnsNameservers`] and [`DnsSearchPaths`].
#[derive(Debug, Clone)]
pub struct TailscaleProvider {
    client: TailscaleClient,
}

impl TailscaleProvider {
    #[must_use]
    pub fn new(client: TailscaleClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &TailscaleClient {
        &self.client
    }

    fn is_not_found(err: &MeshError) -> bool {
        err.status_code() == Some(404)
    }
}

#[async_trait::async_trait]
impl Provider for TailscaleProvider {
    async fn create(&self, resource: &Resource) -> Result<String> {
        match resource {
            Resource::DeviceSubnetRoutes(routes) => {
                self.client
                    .set_device_routes(&routes.device_id, &routes.routes)
                    .await?;
                info!(
                    device_id = %routes.device_id,
                    routes = ?routes.routes,
                    "Enabled subnet routes"
                );
                Ok(routes.device_id.clone())
            }
            Resource::DnsNameservers(dns) => {
                self.client.set_nameservers(&dns.nameservers).await?;
                info!(
                    tailnet = %self.client.tailnet(),
                    nameservers = ?dns.nameservers,
                    "Registered DNS nameservers"
                );
                Ok(self.client.tailnet().to_string())
            }
            Resource::DnsSearchPaths(paths) => {
                self.client.set_search_paths(&paths.search_paths).await?;
                info!(
                    tailnet = %self.client.tailnet(),
                    search_paths = ?paths.search_paths,
                    "Registered DNS search paths"
                );
                Ok(self.client.tailnet().to_string())
            }
            other => bail!("{} is not a Tailscale resource", other.kind()),
        }
    }

    async fn update(&self, _id: &str, resource: &Resource) -> Result<String> {
        // Setters replace whole lists, so an update is a create.
        self.create(resource).await
    }

    async fn delete(&self, entry: &StateEntry) -> Result<()> {
        let result = match entry.kind {
            ResourceKind::DeviceSubnetRoutes => {
                self.client.set_device_routes(&entry.id, &[]).await
            }
            ResourceKind::DnsNameservers => self.client.set_nameservers(&[]).await,
            ResourceKind::DnsSearchPaths => self.client.set_search_paths(&[]).await,
            other => bail!("{other} is not a Tailscale resource"),
        };

        match result {
            Ok(()) => {
                info!(urn = %entry.urn, "Cleared Tailscale setting");
                Ok(())
            }
            Err(e) if Self::is_not_found(&e) => {
                debug!(urn = %entry.urn, "Tailscale setting already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("couldn't clear {}", entry.urn)),
        }
    }

    async fn read(&self, entry: &StateEntry) -> Result<Option<Value>> {
        let live = match entry.kind {
            ResourceKind::DeviceSubnetRoutes => self
                .client
                .device_routes(&entry.id)
                .await?
                .filter(|routes| !routes.is_empty())
                .map(|routes| {
                    serde_json::to_value(DeviceSubnetRoutes {
                        device_id: entry.id.clone(),
                        routes,
                    })
                }),
            ResourceKind::DnsNameservers => {
                let nameservers = self.client.nameservers().await?;
                (!nameservers.is_empty())
                    .then(|| serde_json::to_value(DnsNameservers { nameservers }))
            }
            ResourceKind::DnsSearchPaths => {
                let search_paths = self.client.search_paths().await?;
                (!search_paths.is_empty())
                    .then(|| serde_json::to_value(DnsSearchPaths { search_paths }))
            }
            other => bail!("{other} is not a Tailscale resource"),
        };

        live.transpose()
            .with_context(|| format!("couldn't encode live state of {}", entry.urn))
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for TailscaleProvider {
    async fn list_devices(&self, name_prefix: &str) -> Result<Vec<Device>, MeshError> {
        self.client.list_devices(name_prefix).await
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
