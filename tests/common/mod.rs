// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tsk::config::Settings;
use tsk::engine::{Provider, Providers, Resource, ResourceKind, StateEntry};
use tsk::errors::MeshError;
use tsk::tailscale::{Device, DeviceRegistry};

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(client: &Client, name: &str) -> anyhow::Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "managed-by".to_string(),
                "tsk-test".to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(client: &Client, name: &str) -> anyhow::Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Settings of the reference node: `node1` on `example.ts.net`, user `alice`.
pub fn node1_settings(storage_dir: &Path) -> Settings {
    Settings {
        storage_dir: storage_dir.to_path_buf(),
        ephemeral_key: "k".into(),
        api_key: "a".into(),
        tailnet: "example.ts.net".into(),
        hostname: "node1".into(),
        username: "alice".into(),
        namespace: "default".into(),
        service_cidr: "10.0.0.0/24".into(),
    }
}

pub fn device(id: &str, name: &str, address: &str) -> Device {
    Device {
        id: id.into(),
        name: name.into(),
        addresses: vec![address.into()],
    }
}

/// Device registry whose content can change between runs.
#[derive(Default)]
pub struct FakeRegistry {
    devices: Mutex<Vec<Device>>,
}

impl FakeRegistry {
    pub fn with(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn register(&self, device: Device) {
        self.devices.lock().unwrap().push(device);
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for FakeRegistry {
    async fn list_devices(&self, name_prefix: &str) -> Result<Vec<Device>, MeshError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }
}

/// In-memory provider that keeps live objects keyed by provider id.
#[derive(Default)]
pub struct FakeProvider {
    live: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<String>>,
    fail_kinds: Mutex<HashSet<String>>,
    stall_kinds: Mutex<HashSet<String>>,
}

impl FakeProvider {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn fail_on(&self, type_token: &str) {
        self.fail_kinds.lock().unwrap().insert(type_token.to_string());
    }

    pub fn heal(&self) {
        self.fail_kinds.lock().unwrap().clear();
        self.stall_kinds.lock().unwrap().clear();
    }

    /// Creates of this kind hang until the caller gives up on them.
    pub fn stall_on(&self, type_token: &str) {
        self.stall_kinds.lock().unwrap().insert(type_token.to_string());
    }

    fn key(kind: ResourceKind, id: &str) -> String {
        format!("{kind}|{id}")
    }
}

#[async_trait::async_trait]
impl Provider for FakeProvider {
    async fn create(&self, resource: &Resource) -> anyhow::Result<String> {
        let kind = resource.kind();
        if self.fail_kinds.lock().unwrap().contains(kind.type_token()) {
            anyhow::bail!("{kind} rejected");
        }
        let stalled = self.stall_kinds.lock().unwrap().contains(kind.type_token());
        if stalled {
            std::future::pending::<()>().await;
        }
        let id = resource
            .physical_id()
            .unwrap_or_else(|| "example.ts.net".to_string());
        self.calls.lock().unwrap().push(format!("create {kind}|{id}"));
        self.live
            .lock()
            .unwrap()
            .insert(Self::key(kind, &id), resource.inputs()?);
        Ok(id)
    }

    async fn update(&self, id: &str, resource: &Resource) -> anyhow::Result<String> {
        let kind = resource.kind();
        self.calls.lock().unwrap().push(format!("update {kind}|{id}"));
        self.live
            .lock()
            .unwrap()
            .insert(Self::key(kind, id), resource.inputs()?);
        Ok(id.to_string())
    }

    async fn delete(&self, entry: &StateEntry) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete {}|{}", entry.kind, entry.id));
        self.live.lock().unwrap().remove(&Self::key(entry.kind, &entry.id));
        Ok(())
    }

    async fn read(&self, entry: &StateEntry) -> anyhow::Result<Option<Value>> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .get(&Self::key(entry.kind, &entry.id))
            .cloned())
    }
}

/// Providers backed by one fake provider and the given registry.
pub fn fake_providers(provider: &Arc<FakeProvider>, registry: &Arc<FakeRegistry>) -> Providers {
    Providers {
        kubernetes: provider.clone(),
        tailscale: provider.clone(),
        registry: registry.clone(),
    }
}
