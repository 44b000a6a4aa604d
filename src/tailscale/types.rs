// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tailscale API payloads and declarable resources.

use serde::{Deserialize, Serialize};

/// A device registered in the tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// Fully qualified name, `<hostname>.<tailnet>`
    pub name: String,
    /// Tailnet addresses, IPv4 first as returned by the API
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Subnet routes enabled on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSubnetRoutes {
    pub device_id: String,
    pub routes: Vec<String>,
}

/// Tailnet-wide DNS nameservers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsNameservers {
    pub nameservers: Vec<String>,
}

/// Tailnet-wide DNS search paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsSearchPaths {
    pub search_paths: Vec<String>,
}

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoutesRequest<'a> {
    pub routes: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoutesResponse {
    #[serde(default)]
    pub enabled_routes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NameserversBody {
    #[serde(default)]
    pub dns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchPathsBody {
    #[serde(default)]
    pub search_paths: Vec<String>,
}
