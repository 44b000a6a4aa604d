// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants applied to every Kubernetes object tsk declares.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

// ============================================================================
// Label Values
// ============================================================================

/// Application name for the node
pub const APP_NAME_TSK: &str = "tsk";

/// Component value for the DNS-forwarding node
pub const COMPONENT_DNS_FORWARDER: &str = "dns-forwarder";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_TSK: &str = "tsk";

// ============================================================================
// tsk Selector Labels
// ============================================================================

/// Selector label carrying the application name
pub const LABEL_APP: &str = "app";

/// Selector label carrying the Kubernetes username that owns the node
pub const LABEL_USER: &str = "user";

/// Selector label carrying the tailnet the node joins
pub const LABEL_TAILNET: &str = "tailnet";
