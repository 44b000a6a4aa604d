// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tailnet DNS wiring for a deployed node.
//!
//! A node only appears in the device registry after its mesh client has started and
//! authenticated, so DNS is reconciled after the workload is declared. When the device
//! is found, three Tailscale resources are declared in order:
//!
//! 1. subnet routes advertising the Kubernetes service CIDR, parented to the workload
//! 2. the device's first address as the tailnet nameserver, parented to the routes
//! 3. the `tsk` search path, parented to and depending on the nameservers
//!
//! Each resource replaces a whole list on the control plane, so re-running after a
//! partial failure converges without duplicates.

use crate::config::Config;
use crate::constants::TAILNET_SEARCH_DOMAIN;
use crate::engine::{DeclareOptions, Resource, ResourceHandle, StackContext};
use crate::tailscale::{Device, DeviceSubnetRoutes, DnsNameservers, DnsSearchPaths};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Find the device registered as `<hostname>.<tailnet>`.
///
/// Names are compared exactly, so `node10.<tailnet>` never matches `node1`. When several
/// devices carry the name, the first in registry order wins and the others are logged.
#[must_use]
pub fn find_matching_device<'a>(
    devices: &'a [Device],
    hostname: &str,
    tailnet: &str,
) -> Option<&'a Device> {
    let fqdn = format!("{hostname}.{tailnet}");
    let mut matches = devices.iter().filter(|device| device.name == fqdn);
    let first = matches.next()?;

    let ignored: Vec<&str> = matches.map(|device| device.id.as_str()).collect();
    if !ignored.is_empty() {
        warn!(
            name = %fqdn,
            selected = %first.id,
            ignored = ?ignored,
            "Multiple devices registered under the same name, using the first one"
        );
    }

    Some(first)
}

/// Wire the tailnet's DNS to this node.
///
/// Returns `Ok(false)` without declaring anything while the device is not registered
/// yet (or has no address), and `Ok(true)` once all three resources are declared.
///
/// # Errors
///
/// Returns an error if the device query or any of the three declarations fails;
/// resources declared before the failure stay in place.
pub async fn reconcile_dns(
    ctx: &mut dyn StackContext,
    config: &Config,
    workload: &ResourceHandle,
) -> Result<bool> {
    let hostname = &config.tailscale.hostname;
    let devices = ctx
        .devices(hostname)
        .await
        .context("couldn't fetch devices")?;

    let Some(device) = find_matching_device(&devices, hostname, &config.tailscale.tailnet) else {
        info!(
            name = %config.device_fqdn(),
            candidates = devices.len(),
            "Device not registered yet, skipping DNS setup"
        );
        return Ok(false);
    };

    let Some(address) = device.addresses.first() else {
        warn!(
            name = %device.name,
            id = %device.id,
            "Device has no tailnet address yet, skipping DNS setup"
        );
        return Ok(false);
    };

    debug!(name = %device.name, id = %device.id, address = %address, "Found node device");

    let routes = ctx
        .declare(
            &device.name,
            Resource::DeviceSubnetRoutes(DeviceSubnetRoutes {
                device_id: device.id.clone(),
                routes: vec![config.kubernetes.service_cidr.clone()],
            }),
            DeclareOptions::parent(workload),
        )
        .await
        .context("couldn't create subnet routes")?;

    let nameservers = ctx
        .declare(
            &device.name,
            Resource::DnsNameservers(DnsNameservers {
                nameservers: vec![address.clone()],
            }),
            DeclareOptions::parent(&routes),
        )
        .await
        .context("couldn't register DNS nameservers")?;

    ctx.declare(
        &device.name,
        Resource::DnsSearchPaths(DnsSearchPaths {
            search_paths: vec![TAILNET_SEARCH_DOMAIN.to_string()],
        }),
        DeclareOptions::parent(&nameservers).depends_on(&nameservers),
    )
    .await
    .context("couldn't register DNS search paths")?;

    info!(
        name = %device.name,
        nameserver = %address,
        cidr = %config.kubernetes.service_cidr,
        "Tailnet DNS configured"
    );
    Ok(true)
}
