// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes resource builders for the tsk node.
//!
//! The builders are pure functions of the validated [`Config`]. [`declare_node`] hands
//! their output to a [`StackContext`] as a tree rooted at the `ServiceAccount`: every
//! other object is parented to it, so tearing the identity down removes the rest first.

use crate::config::Config;
use crate::constants::{
    CONTAINER_NAME_COREDNS, CONTAINER_NAME_TAILSCALED, COREDNS_IMAGE, COREDNS_LIVENESS_PATH,
    COREDNS_LIVENESS_PORT, COREDNS_READINESS_PATH, COREDNS_READINESS_PORT, COREFILE_KEY,
    COREFILE_MOUNT_PATH, DECL_CONFIGMAP, DECL_DEPLOYMENT, DECL_ROLE, DECL_ROLE_BINDING, DECL_SECRET,
    DECL_SERVICE_ACCOUNT, IMAGE_PULL_POLICY, NODE_REPLICAS, ROLLING_UPDATE_MAX_SURGE,
    ROLLING_UPDATE_MAX_UNAVAILABLE, SECRET_KEY_EPHEMERAL_KEY, TAILSCALED_SOCKET, TAILSCALE_IMAGE,
    TAILSCALE_NONROOT_UID, VOLUME_COREFILE,
};
use crate::engine::{DeclareOptions, Resource, ResourceHandle, StackContext};
use crate::labels::{
    APP_NAME_TSK, COMPONENT_DNS_FORWARDER, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME,
    LABEL_APP, LABEL_TAILNET, LABEL_USER, MANAGED_BY_TSK,
};
use crate::template::render_corefile;
use anyhow::{Context, Result};
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
    core::v1::{
        ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
        ExecAction, HTTPGetAction, Lifecycle, LifecycleHandler, PodSpec, PodTemplateSpec, Probe,
        Secret, SecretKeySelector, SecurityContext, ServiceAccount, Volume, VolumeMount,
    },
    rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject},
};
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{LabelSelector, ObjectMeta},
    util::intstr::IntOrString,
};
use std::collections::BTreeMap;
use tracing::debug;

// Environment variables read by the mesh-client container
const ENV_KUBE_SECRET: &str = "TSK_KUBE_SECRET";
const ENV_CIDR: &str = "TSK_CIDR";
const ENV_HOSTNAME: &str = "TSK_HOSTNAME";

/// Handles of the six objects that make up a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandles {
    pub service_account: ResourceHandle,
    pub role: ResourceHandle,
    pub role_binding: ResourceHandle,
    pub secret: ResourceHandle,
    pub configmap: ResourceHandle,
    pub deployment: ResourceHandle,
}

/// Builds the labels applied to the workload, its pods and its selector.
///
/// # Arguments
///
/// * `config` - Validated configuration
///
/// # Returns
///
/// `app`, `user` and `tailnet` selector labels
#[must_use]
pub fn build_selector_labels(config: &Config) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), APP_NAME_TSK.to_string()),
        (LABEL_USER.to_string(), config.kubernetes.username.clone()),
        (LABEL_TAILNET.to_string(), config.tailscale.tailnet.clone()),
    ])
}

/// Builds the full label set: selector labels plus the standard `app.kubernetes.io/*` labels.
#[must_use]
pub fn build_labels(config: &Config) -> BTreeMap<String, String> {
    let mut labels = build_selector_labels(config);
    labels.insert(K8S_NAME.into(), APP_NAME_TSK.into());
    labels.insert(K8S_INSTANCE.into(), config.identity_name());
    labels.insert(K8S_COMPONENT.into(), COMPONENT_DNS_FORWARDER.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_TSK.into());
    labels
}

fn build_metadata(config: &Config) -> ObjectMeta {
    ObjectMeta {
        name: Some(config.identity_name()),
        namespace: Some(config.kubernetes.namespace.clone()),
        labels: Some(build_labels(config)),
        ..Default::default()
    }
}

/// Builds the `ServiceAccount` the node runs as.
#[must_use]
pub fn build_service_account(config: &Config) -> ServiceAccount {
    ServiceAccount {
        metadata: build_metadata(config),
        ..Default::default()
    }
}

/// Builds the `Role` that lets the mesh client persist its state.
///
/// Access is limited to the node's own `Secret` and `Deployment` by name; the rules
/// never grant access to other objects of those kinds.
#[must_use]
pub fn build_role(config: &Config) -> Role {
    let name = config.identity_name();

    Role {
        metadata: build_metadata(config),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["secrets".into()]),
                resource_names: Some(vec![name.clone()]),
                verbs: vec!["get".into(), "create".into(), "update".into(), "patch".into()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["apps".into()]),
                resources: Some(vec!["deployments".into()]),
                resource_names: Some(vec![name]),
                verbs: vec!["get".into(), "update".into(), "patch".into()],
                ..Default::default()
            },
        ]),
    }
}

/// Builds the `RoleBinding` granting [`build_role`] to [`build_service_account`].
#[must_use]
pub fn build_role_binding(config: &Config) -> RoleBinding {
    let name = config.identity_name();

    RoleBinding {
        metadata: build_metadata(config),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "Role".into(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name,
            namespace: Some(config.kubernetes.namespace.clone()),
            ..Default::default()
        }]),
    }
}

/// Builds the `Secret` holding the ephemeral auth key.
///
/// The mesh daemon also writes its own state into this secret at runtime.
#[must_use]
pub fn build_secret(config: &Config) -> Secret {
    Secret {
        metadata: build_metadata(config),
        string_data: Some(BTreeMap::from([(
            SECRET_KEY_EPHEMERAL_KEY.to_string(),
            config.tailscale.ephemeral_key.clone(),
        )])),
        ..Default::default()
    }
}

/// Builds the `ConfigMap` carrying the rendered Corefile.
///
/// # Errors
///
/// Returns an error if the Corefile template cannot be rendered.
pub fn build_configmap(config: &Config) -> Result<ConfigMap> {
    let corefile = render_corefile(&config.kubernetes).context("couldn't render Corefile")?;

    Ok(ConfigMap {
        metadata: build_metadata(config),
        data: Some(BTreeMap::from([(COREFILE_KEY.to_string(), corefile)])),
        ..Default::default()
    })
}

fn http_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.into()),
            port: IntOrString::Int(port),
            scheme: Some("HTTP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_coredns_container() -> Container {
    Container {
        name: CONTAINER_NAME_COREDNS.into(),
        image: Some(COREDNS_IMAGE.into()),
        image_pull_policy: Some(IMAGE_PULL_POLICY.into()),
        args: Some(vec![
            "-conf".into(),
            format!("{COREFILE_MOUNT_PATH}/{COREFILE_KEY}"),
        ]),
        ports: Some(vec![
            ContainerPort {
                name: Some("liveness".into()),
                container_port: COREDNS_LIVENESS_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("readiness".into()),
                container_port: COREDNS_READINESS_PORT,
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_COREFILE.into(),
            mount_path: COREFILE_MOUNT_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        }]),
        liveness_probe: Some(http_probe(COREDNS_LIVENESS_PATH, COREDNS_LIVENESS_PORT)),
        readiness_probe: Some(http_probe(COREDNS_READINESS_PATH, COREDNS_READINESS_PORT)),
        ..Default::default()
    }
}

fn build_tailscaled_container(config: &Config) -> Container {
    let name = config.identity_name();

    let daemon = format!(
        "tailscaled --state=kube:${ENV_KUBE_SECRET} --socket={TAILSCALED_SOCKET} \
         --tun=userspace-networking"
    );
    let join = format!(
        "tailscale --socket={TAILSCALED_SOCKET} up --accept-dns=false \
         --advertise-routes=${ENV_CIDR} --authkey=${SECRET_KEY_EPHEMERAL_KEY} \
         --hostname=${ENV_HOSTNAME}"
    );

    Container {
        name: CONTAINER_NAME_TAILSCALED.into(),
        image: Some(TAILSCALE_IMAGE.into()),
        image_pull_policy: Some(IMAGE_PULL_POLICY.into()),
        env: Some(vec![
            EnvVar {
                name: ENV_KUBE_SECRET.into(),
                value: Some(name.clone()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_CIDR.into(),
                value: Some(config.kubernetes.service_cidr.clone()),
                ..Default::default()
            },
            EnvVar {
                name: SECRET_KEY_EPHEMERAL_KEY.into(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name,
                        key: SECRET_KEY_EPHEMERAL_KEY.into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: ENV_HOSTNAME.into(),
                value: Some(config.tailscale.hostname.clone()),
                ..Default::default()
            },
        ]),
        command: Some(vec!["sh".into(), "-c".into(), daemon]),
        lifecycle: Some(Lifecycle {
            post_start: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec!["sh".into(), "-c".into(), join]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            run_as_user: Some(TAILSCALE_NONROOT_UID),
            run_as_group: Some(TAILSCALE_NONROOT_UID),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the single-replica `Deployment` running the DNS forwarder and the mesh client.
///
/// The rolling update removes the old pod before starting the new one, so at most one
/// copy of the node is ever registered with the tailnet.
#[must_use]
pub fn build_deployment(config: &Config) -> Deployment {
    let name = config.identity_name();
    let selector_labels = build_selector_labels(config);

    debug!(
        name = %name,
        namespace = %config.kubernetes.namespace,
        "Building node Deployment"
    );

    Deployment {
        metadata: build_metadata(config),
        spec: Some(DeploymentSpec {
            replicas: Some(NODE_REPLICAS),
            strategy: Some(DeploymentStrategy {
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String(ROLLING_UPDATE_MAX_SURGE.into())),
                    max_unavailable: Some(IntOrString::String(
                        ROLLING_UPDATE_MAX_UNAVAILABLE.into(),
                    )),
                }),
                ..Default::default()
            }),
            selector: LabelSelector {
                match_labels: Some(selector_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(name.clone()),
                    volumes: Some(vec![Volume {
                        name: VOLUME_COREFILE.into(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: name.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    containers: vec![build_coredns_container(), build_tailscaled_container(config)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Declare the node's six Kubernetes objects.
///
/// # Errors
///
/// Returns the first declaration error unchanged; nothing after it is declared.
pub async fn declare_node(ctx: &mut dyn StackContext, config: &Config) -> Result<NodeHandles> {
    let service_account = ctx
        .declare(
            DECL_SERVICE_ACCOUNT,
            Resource::ServiceAccount(build_service_account(config)),
            DeclareOptions::default(),
        )
        .await?;
    let under_identity = DeclareOptions::parent(&service_account);

    let role = ctx
        .declare(
            DECL_ROLE,
            Resource::Role(build_role(config)),
            under_identity.clone(),
        )
        .await?;

    let role_binding = ctx
        .declare(
            DECL_ROLE_BINDING,
            Resource::RoleBinding(build_role_binding(config)),
            under_identity.clone(),
        )
        .await?;

    let secret = ctx
        .declare(
            DECL_SECRET,
            Resource::Secret(build_secret(config)),
            under_identity.clone().delete_before_replace(),
        )
        .await?;

    let configmap = ctx
        .declare(
            DECL_CONFIGMAP,
            Resource::ConfigMap(build_configmap(config)?),
            under_identity.clone(),
        )
        .await?;

    let deployment = ctx
        .declare(
            DECL_DEPLOYMENT,
            Resource::Deployment(Box::new(build_deployment(config))),
            under_identity,
        )
        .await?;

    debug!(
        identity = %config.identity_name(),
        namespace = %config.kubernetes.namespace,
        "Declared node resources"
    );

    Ok(NodeHandles {
        service_account,
        role,
        role_binding,
        secret,
        configmap,
        deployment,
    })
}
