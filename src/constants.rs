// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for tsk.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Stack Constants
// ============================================================================

/// Project name recorded in every stack state file
pub const PROJECT_NAME: &str = "tailscale-k8s";

/// Prefix for the identity name derived from the Kubernetes username
pub const IDENTITY_NAME_PREFIX: &str = "tsk";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "tsk";

/// Stack output reporting whether tailnet DNS was wired to the node
pub const OUTPUT_DNS_CONFIGURED: &str = "dnsConfigured";

/// Pinned version of the Kubernetes provider plugin
pub const KUBERNETES_PLUGIN_VERSION: &str = "v3.8.2";

/// Pinned version of the Tailscale provider plugin
pub const TAILSCALE_PLUGIN_VERSION: &str = "v0.1.0";

/// Provider package name for Kubernetes resources
pub const PACKAGE_KUBERNETES: &str = "kubernetes";

/// Provider package name for Tailscale resources
pub const PACKAGE_TAILSCALE: &str = "tailscale";

/// Stack config key holding the Tailscale API key (secret)
pub const CONFIG_TAILSCALE_API_KEY: &str = "tailscale:apiKey";

/// Stack config key holding the tailnet name
pub const CONFIG_TAILSCALE_TAILNET: &str = "tailscale:tailnet";

// ============================================================================
// Logical Declaration Names
// ============================================================================

pub const DECL_SERVICE_ACCOUNT: &str = "service-account";
pub const DECL_ROLE: &str = "role";
pub const DECL_ROLE_BINDING: &str = "role-binding";
pub const DECL_SECRET: &str = "secret";
pub const DECL_CONFIGMAP: &str = "configmap";
pub const DECL_DEPLOYMENT: &str = "deployment";

// ============================================================================
// Tailscale Constants
// ============================================================================

/// Base URL of the Tailscale v2 API
pub const TAILSCALE_API_BASE_URL: &str = "https://api.tailscale.com/api/v2";

/// Search domain registered with tailnet DNS
pub const TAILNET_SEARCH_DOMAIN: &str = "tsk";

/// HTTP timeout for Tailscale API calls
pub const TAILSCALE_API_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Secret Constants
// ============================================================================

/// Key under which the ephemeral auth key is stored in the node `Secret`
pub const SECRET_KEY_EPHEMERAL_KEY: &str = "TSK_EPHEMERAL_KEY";

/// Prefix applied to digests of secret values recorded in stack state
pub const SECRET_DIGEST_PREFIX: &str = "sha256:";

// ============================================================================
// Workload Constants
// ============================================================================

/// Replica count for the node `Deployment` (one mesh registration at a time)
pub const NODE_REPLICAS: i32 = 1;

/// Rolling update surge: never run old and new pods side by side
pub const ROLLING_UPDATE_MAX_SURGE: &str = "0%";

/// Rolling update unavailability: remove every old pod before adding new ones
pub const ROLLING_UPDATE_MAX_UNAVAILABLE: &str = "100%";

/// Container name of the DNS forwarder
pub const CONTAINER_NAME_COREDNS: &str = "coredns";

/// Container name of the mesh client
pub const CONTAINER_NAME_TAILSCALED: &str = "tailscaled";

/// Image for the DNS forwarder
pub const COREDNS_IMAGE: &str = "coredns/coredns";

/// Image for the mesh client
pub const TAILSCALE_IMAGE: &str = "tailscale/tailscale";

/// Pull policy for both containers
pub const IMAGE_PULL_POLICY: &str = "Always";

/// Liveness port served by the CoreDNS `health` plugin
pub const COREDNS_LIVENESS_PORT: i32 = 8080;

/// Readiness port served by the CoreDNS `ready` plugin
pub const COREDNS_READINESS_PORT: i32 = 8181;

/// Liveness probe HTTP path
pub const COREDNS_LIVENESS_PATH: &str = "/health";

/// Readiness probe HTTP path
pub const COREDNS_READINESS_PATH: &str = "/ready";

/// Directory where the Corefile `ConfigMap` is mounted
pub const COREFILE_MOUNT_PATH: &str = "/etc/coredns";

/// `ConfigMap` entry (and file name) holding the rendered Corefile
pub const COREFILE_KEY: &str = "Corefile";

/// Volume name for the Corefile mount
pub const VOLUME_COREFILE: &str = "corefile";

/// Non-root UID/GID for the mesh client container
pub const TAILSCALE_NONROOT_UID: i64 = 1000;

/// Unix socket shared by `tailscaled` and the `tailscale up` hook
pub const TAILSCALED_SOCKET: &str = "/tmp/tailscaled.sock";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 2;

/// Maximum length of a DNS-1123 subdomain
pub const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

/// Maximum length of a DNS-1123 label
pub const DNS1123_LABEL_MAX_LEN: usize = 63;

/// Maximum length of a Kubernetes label value
pub const LABEL_VALUE_MAX_LEN: usize = 63;
