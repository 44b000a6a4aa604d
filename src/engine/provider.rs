// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Providers realize declared resources against live systems.
//!
//! The Kubernetes provider uses server-side apply (SSA) for idempotent create and
//! update, tolerates already-deleted objects on delete, and reads live objects back in
//! the shape they were declared in.

use super::diff::project_onto;
use super::graph::{Resource, ResourceKind};
use super::state::StateEntry;
use crate::constants::{
    FIELD_MANAGER, KUBERNETES_PLUGIN_VERSION, PACKAGE_KUBERNETES, PACKAGE_TAILSCALE,
    TAILSCALE_PLUGIN_VERSION,
};
use crate::errors::EngineError;
use crate::tailscale::DeviceRegistry;
use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Secret, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource as KubeResource};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Realizes one family of resources.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Create the object and return its provider id.
    async fn create(&self, resource: &Resource) -> Result<String>;

    /// Bring an existing object in line with `resource` and return its provider id.
    async fn update(&self, id: &str, resource: &Resource) -> Result<String>;

    /// Delete a recorded object. Objects that are already gone are not an error.
    async fn delete(&self, entry: &StateEntry) -> Result<()>;

    /// Read a recorded object: `None` if it no longer exists, otherwise the inputs
    /// that should be recorded for it.
    async fn read(&self, entry: &StateEntry) -> Result<Option<Value>>;
}

/// Installed provider plugins and their pinned versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plugins(BTreeMap<String, String>);

impl Plugins {
    /// Both plugins tsk needs, at their pinned versions.
    #[must_use]
    pub fn pinned() -> Self {
        let mut plugins = Self::default();
        plugins.0.insert(
            PACKAGE_KUBERNETES.to_string(),
            KUBERNETES_PLUGIN_VERSION.to_string(),
        );
        plugins.0.insert(
            PACKAGE_TAILSCALE.to_string(),
            TAILSCALE_PLUGIN_VERSION.to_string(),
        );
        plugins
    }

    /// Install a plugin. Re-installing replaces the pinned version.
    ///
    /// # Errors
    ///
    /// Returns an error for packages tsk has no provider for.
    pub fn install(&mut self, package: &str, version: &str) -> Result<()> {
        if package != PACKAGE_KUBERNETES && package != PACKAGE_TAILSCALE {
            bail!("no provider available for plugin '{package}'");
        }
        if !version.starts_with('v') {
            bail!("plugin version '{version}' must start with 'v'");
        }
        info!(plugin = %package, version = %version, "Installed provider plugin");
        self.0.insert(package.to_string(), version.to_string());
        Ok(())
    }

    /// Fail unless the plugin for `kind` is installed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingPlugin`].
    pub fn require(&self, kind: ResourceKind) -> Result<(), EngineError> {
        if self.0.contains_key(kind.package()) {
            Ok(())
        } else {
            Err(EngineError::MissingPlugin {
                package: kind.package().to_string(),
            })
        }
    }

    #[must_use]
    pub fn versions(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// The providers and registry an operation runs against.
#[derive(Clone)]
pub struct Providers {
    pub kubernetes: Arc<dyn Provider>,
    pub tailscale: Arc<dyn Provider>,
    pub registry: Arc<dyn DeviceRegistry>,
}

impl Providers {
    /// Provider responsible for `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: ResourceKind) -> &Arc<dyn Provider> {
        if kind.package() == PACKAGE_TAILSCALE {
            &self.tailscale
        } else {
            &self.kubernetes
        }
    }
}

/// Provider for the namespaced Kubernetes objects of a node.
#[derive(Clone)]
pub struct KubernetesProvider {
    client: Client,
}

impl KubernetesProvider {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Split a `namespace/name` provider id.
fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once('/')
        .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
        .ok_or_else(|| anyhow!("invalid Kubernetes object id '{id}'"))
}

/// Create or update a namespaced resource using server-side apply.
async fn apply_namespaced<T>(client: &Client, resource: &T) -> Result<String>
where
    T: KubeResource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned,
{
    let name = resource
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| anyhow!("Resource must have a name"))?;
    let namespace = resource
        .meta()
        .namespace
        .as_ref()
        .ok_or_else(|| anyhow!("Resource must have a namespace"))?;

    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %T::kind(&()),
        "Creating or updating resource with Apply strategy"
    );

    if api.get_opt(name).await?.is_some() {
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(resource),
        )
        .await?;
        info!("Updated {} {}/{}", T::kind(&()), namespace, name);
    } else {
        api.create(&PostParams::default(), resource).await?;
        info!("Created {} {}/{}", T::kind(&()), namespace, name);
    }

    Ok(format!("{namespace}/{name}"))
}

/// Delete a namespaced resource, treating 404 as success.
async fn delete_namespaced<T>(client: &Client, id: &str) -> Result<()>
where
    T: KubeResource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let (namespace, name) = split_id(id)?;
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            info!("Deleted {} {}/{}", T::kind(&()), namespace, name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!("{} {}/{} already deleted", T::kind(&()), namespace, name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch a namespaced resource, or `None` if it does not exist.
async fn get_namespaced<T>(client: &Client, id: &str) -> Result<Option<T>>
where
    T: KubeResource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let (namespace, name) = split_id(id)?;
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    Ok(api.get_opt(name).await?)
}

/// Express a live Secret the way it is declared: the API only returns `data`, while
/// tsk declares `stringData`.
fn secret_as_declared(mut secret: Secret) -> Secret {
    if let Some(data) = secret.data.take() {
        let mut string_data = secret.string_data.take().unwrap_or_default();
        for (key, value) in data {
            string_data.insert(key, String::from_utf8_lossy(&value.0).into_owned());
        }
        secret.string_data = Some(string_data);
    }
    secret
}

#[async_trait::async_trait]
impl Provider for KubernetesProvider {
    async fn create(&self, resource: &Resource) -> Result<String> {
        let client = &self.client;
        match resource {
            Resource::ServiceAccount(o) => apply_namespaced(client, o).await,
            Resource::Role(o) => apply_namespaced(client, o).await,
            Resource::RoleBinding(o) => apply_namespaced(client, o).await,
            Resource::Secret(o) => apply_namespaced(client, o).await,
            Resource::ConfigMap(o) => apply_namespaced(client, o).await,
            Resource::Deployment(o) => apply_namespaced(client, o.as_ref()).await,
            other => bail!("{} is not a Kubernetes resource", other.kind()),
        }
    }

    async fn update(&self, _id: &str, resource: &Resource) -> Result<String> {
        self.create(resource).await
    }

    async fn delete(&self, entry: &StateEntry) -> Result<()> {
        let (client, id) = (&self.client, entry.id.as_str());
        match entry.kind {
            ResourceKind::ServiceAccount => delete_namespaced::<ServiceAccount>(client, id).await,
            ResourceKind::Role => delete_namespaced::<Role>(client, id).await,
            ResourceKind::RoleBinding => delete_namespaced::<RoleBinding>(client, id).await,
            ResourceKind::Secret => delete_namespaced::<Secret>(client, id).await,
            ResourceKind::ConfigMap => delete_namespaced::<ConfigMap>(client, id).await,
            ResourceKind::Deployment => delete_namespaced::<Deployment>(client, id).await,
            other => bail!("{other} is not a Kubernetes resource"),
        }
    }

    /// Read the live object and project it onto the recorded inputs, so `refresh`
    /// records drift in declared fields only.
    async fn read(&self, entry: &StateEntry) -> Result<Option<Value>> {
        let (client, id) = (&self.client, entry.id.as_str());
        let live = match entry.kind {
            ResourceKind::ServiceAccount => get_namespaced(client, id)
                .await?
                .map(Resource::ServiceAccount),
            ResourceKind::Role => get_namespaced(client, id).await?.map(Resource::Role),
            ResourceKind::RoleBinding => {
                get_namespaced(client, id).await?.map(Resource::RoleBinding)
            }
            ResourceKind::Secret => get_namespaced(client, id)
                .await?
                .map(|secret| Resource::Secret(secret_as_declared(secret))),
            ResourceKind::ConfigMap => get_namespaced(client, id).await?.map(Resource::ConfigMap),
            ResourceKind::Deployment => get_namespaced(client, id)
                .await?
                .map(|deployment| Resource::Deployment(Box::new(deployment))),
            other => bail!("{other} is not a Kubernetes resource"),
        };

        let Some(live) = live else {
            debug!(id = %id, kind = %entry.kind, "Object no longer exists");
            return Ok(None);
        };
        let live = live
            .inputs()
            .with_context(|| format!("couldn't encode live state of {}", entry.urn))?;
        Ok(Some(project_onto(&entry.inputs, &live)))
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
