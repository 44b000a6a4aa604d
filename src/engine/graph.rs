// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource graph model shared by every engine operation.
//!
//! A [`Program`] declares resources through a [`StackContext`]. Each declaration
//! returns a [`ResourceHandle`] that later declarations use as their parent or as an
//! explicit dependency. Parent edges drive deletion order: children are always
//! removed before the resource they hang off.

use crate::constants::{PACKAGE_KUBERNETES, PACKAGE_TAILSCALE, SECRET_DIGEST_PREFIX};
use crate::errors::EngineError;
use crate::tailscale::{Device, DeviceSubnetRoutes, DnsNameservers, DnsSearchPaths};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Secret, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Every kind of resource tsk knows how to realize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    ServiceAccount,
    Role,
    RoleBinding,
    Secret,
    ConfigMap,
    Deployment,
    DeviceSubnetRoutes,
    DnsNameservers,
    DnsSearchPaths,
}

impl ResourceKind {
    /// Type token used in URNs.
    #[must_use]
    pub fn type_token(self) -> &'static str {
        match self {
            Self::ServiceAccount => "kubernetes:core/v1:ServiceAccount",
            Self::Role => "kubernetes:rbac.authorization.k8s.io/v1:Role",
            Self::RoleBinding => "kubernetes:rbac.authorization.k8s.io/v1:RoleBinding",
            Self::Secret => "kubernetes:core/v1:Secret",
            Self::ConfigMap => "kubernetes:core/v1:ConfigMap",
            Self::Deployment => "kubernetes:apps/v1:Deployment",
            Self::DeviceSubnetRoutes => "tailscale:index/deviceSubnetRoutes:DeviceSubnetRoutes",
            Self::DnsNameservers => "tailscale:index/dnsNameservers:DnsNameservers",
            Self::DnsSearchPaths => "tailscale:index/dnsSearchPaths:DnsSearchPaths",
        }
    }

    /// Provider package that realizes this kind.
    #[must_use]
    pub fn package(self) -> &'static str {
        match self {
            Self::DeviceSubnetRoutes | Self::DnsNameservers | Self::DnsSearchPaths => {
                PACKAGE_TAILSCALE
            }
            _ => PACKAGE_KUBERNETES,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

/// Typed payload of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    Secret(Secret),
    ConfigMap(ConfigMap),
    Deployment(Box<Deployment>),
    DeviceSubnetRoutes(DeviceSubnetRoutes),
    DnsNameservers(DnsNameservers),
    DnsSearchPaths(DnsSearchPaths),
}

impl Resource {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::ServiceAccount(_) => ResourceKind::ServiceAccount,
            Self::Role(_) => ResourceKind::Role,
            Self::RoleBinding(_) => ResourceKind::RoleBinding,
            Self::Secret(_) => ResourceKind::Secret,
            Self::ConfigMap(_) => ResourceKind::ConfigMap,
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::DeviceSubnetRoutes(_) => ResourceKind::DeviceSubnetRoutes,
            Self::DnsNameservers(_) => ResourceKind::DnsNameservers,
            Self::DnsSearchPaths(_) => ResourceKind::DnsSearchPaths,
        }
    }

    /// Identity of the realized object, when it is known before realization.
    ///
    /// Kubernetes objects are identified by `namespace/name`, subnet routes by device id.
    /// Tailnet-wide DNS settings have a single instance and return `None`.
    #[must_use]
    pub fn physical_id(&self) -> Option<String> {
        use kube::Resource as _;

        let meta = match self {
            Self::ServiceAccount(o) => o.meta(),
            Self::Role(o) => o.meta(),
            Self::RoleBinding(o) => o.meta(),
            Self::Secret(o) => o.meta(),
            Self::ConfigMap(o) => o.meta(),
            Self::Deployment(o) => o.meta(),
            Self::DeviceSubnetRoutes(routes) => return Some(routes.device_id.clone()),
            Self::DnsNameservers(_) | Self::DnsSearchPaths(_) => return None,
        };

        Some(format!(
            "{}/{}",
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default()
        ))
    }

    /// Inputs recorded in stack state.
    ///
    /// Secret values are replaced by their SHA-256 digest, so a changed credential is
    /// still detected without ever writing it to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn inputs(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::ServiceAccount(o) => serde_json::to_value(o),
            Self::Role(o) => serde_json::to_value(o),
            Self::RoleBinding(o) => serde_json::to_value(o),
            Self::Secret(o) => serde_json::to_value(redact_secret(o)),
            Self::ConfigMap(o) => serde_json::to_value(o),
            Self::Deployment(o) => serde_json::to_value(o),
            Self::DeviceSubnetRoutes(o) => serde_json::to_value(o),
            Self::DnsNameservers(o) => serde_json::to_value(o),
            Self::DnsSearchPaths(o) => serde_json::to_value(o),
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    format!("{SECRET_DIGEST_PREFIX}{:x}", Sha256::digest(bytes))
}

fn redact_secret(secret: &Secret) -> Secret {
    let mut redacted = secret.clone();
    redacted.string_data = secret.string_data.as_ref().map(|data| {
        data.iter()
            .map(|(k, v)| (k.clone(), digest(v.as_bytes())))
            .collect::<BTreeMap<_, _>>()
    });
    redacted.data = secret.data.as_ref().map(|data| {
        data.iter()
            .map(|(k, v)| (k.clone(), ByteString(digest(&v.0).into_bytes())))
            .collect::<BTreeMap<_, _>>()
    });
    redacted
}

/// Reference to a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceHandle {
    #[must_use]
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }

    /// Unique resource name within a stack: `<type token>::<logical name>`.
    #[must_use]
    pub fn urn(&self) -> String {
        format!("{}::{}", self.kind.type_token(), self.name)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn())
    }
}

/// Options attached to a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclareOptions {
    /// Resource this one hangs off; deleting the parent deletes this first
    pub parent: Option<ResourceHandle>,
    /// Resources that must be realized before this one
    pub depends_on: Vec<ResourceHandle>,
    /// Delete the old object before creating its replacement
    pub delete_before_replace: bool,
}

impl DeclareOptions {
    /// Options with only a parent edge.
    #[must_use]
    pub fn parent(parent: &ResourceHandle) -> Self {
        Self {
            parent: Some(parent.clone()),
            ..Default::default()
        }
    }

    /// Add an explicit ordering dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: &ResourceHandle) -> Self {
        self.depends_on.push(dependency.clone());
        self
    }

    /// Replace by deleting first.
    #[must_use]
    pub fn delete_before_replace(mut self) -> Self {
        self.delete_before_replace = true;
        self
    }
}

/// One recorded declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub handle: ResourceHandle,
    pub resource: Resource,
    pub options: DeclareOptions,
}

impl Declaration {
    /// URN of the parent, if any.
    #[must_use]
    pub fn parent_urn(&self) -> Option<String> {
        self.options.parent.as_ref().map(ResourceHandle::urn)
    }

    /// URNs of the explicit dependencies.
    #[must_use]
    pub fn dependency_urns(&self) -> Vec<String> {
        self.options
            .depends_on
            .iter()
            .map(ResourceHandle::urn)
            .collect()
    }
}

/// Ordered, validated record of the declarations made in one pass.
#[derive(Debug, Default)]
pub struct Graph {
    declarations: Vec<Declaration>,
    urns: HashSet<String>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateResource`] if the URN was already declared, or
    /// [`EngineError::UnknownReference`] if the parent or a dependency was not declared earlier.
    pub fn record(
        &mut self,
        name: &str,
        resource: Resource,
        options: DeclareOptions,
    ) -> Result<&Declaration, EngineError> {
        let handle = ResourceHandle::new(resource.kind(), name);
        let urn = handle.urn();

        if self.urns.contains(&urn) {
            return Err(EngineError::DuplicateResource { urn });
        }

        for reference in options.parent.iter().chain(options.depends_on.iter()) {
            let reference = reference.urn();
            if !self.urns.contains(&reference) {
                return Err(EngineError::UnknownReference { urn, reference });
            }
        }

        self.urns.insert(urn);
        self.declarations.push(Declaration {
            handle,
            resource,
            options,
        });

        let index = self.declarations.len() - 1;
        Ok(&self.declarations[index])
    }

    /// Declarations in the order they were made.
    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    #[must_use]
    pub fn contains(&self, urn: &str) -> bool {
        self.urns.contains(urn)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Find a declaration by URN.
    #[must_use]
    pub fn get(&self, urn: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.handle.urn() == urn)
    }
}

/// Capability handed to a [`Program`]: declare resources, export outputs, query devices.
#[async_trait::async_trait]
pub trait StackContext: Send + Sync {
    /// Declare a resource under a logical `name`.
    async fn declare(
        &mut self,
        name: &str,
        resource: Resource,
        options: DeclareOptions,
    ) -> Result<ResourceHandle, EngineError>;

    /// Export a stack output.
    fn export(&mut self, key: &str, value: Value);

    /// Query the tailnet device registry.
    async fn devices(&self, name_prefix: &str) -> Result<Vec<Device>, EngineError>;
}

/// A function that declares the stack's desired state.
#[async_trait::async_trait]
pub trait Program: Send + Sync {
    async fn run(&self, ctx: &mut dyn StackContext) -> anyhow::Result<()>;
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;
