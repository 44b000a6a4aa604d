// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end scenarios for a tsk node.
//!
//! Everything runs in-process against fake providers and a fake device registry, so no
//! cluster or tailnet is required.

mod common;

use common::{device, fake_providers, node1_settings, FakeProvider, FakeRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tsk::engine::{Program, RecordingContext, Resource, ResourceKind};
use tsk::errors::ConfigError;
use tsk::program::TskProgram;
use tsk::stack::get_stack;

// ============================================================================
// Reconciliation pass scenarios
// ============================================================================

#[tokio::test]
async fn scenario_matching_device_configures_dns() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();
    let registry = Arc::new(FakeRegistry::with(vec![device(
        "1",
        "node1.example.ts.net",
        "100.64.0.1",
    )]));

    let mut ctx = RecordingContext::new(registry);
    TskProgram::new(config).run(&mut ctx).await.unwrap();

    let declarations = ctx.graph().declarations();
    assert_eq!(declarations.len(), 9);

    let node: Vec<_> = declarations[..6].iter().map(|d| d.handle.kind).collect();
    assert_eq!(
        node,
        vec![
            ResourceKind::ServiceAccount,
            ResourceKind::Role,
            ResourceKind::RoleBinding,
            ResourceKind::Secret,
            ResourceKind::ConfigMap,
            ResourceKind::Deployment,
        ]
    );

    match &declarations[6].resource {
        Resource::DeviceSubnetRoutes(routes) => {
            assert_eq!(routes.device_id, "1");
            assert_eq!(routes.routes, vec!["10.0.0.0/24"]);
        }
        other => panic!("expected subnet routes, got {other:?}"),
    }
    match &declarations[7].resource {
        Resource::DnsNameservers(ns) => assert_eq!(ns.nameservers, vec!["100.64.0.1"]),
        other => panic!("expected nameservers, got {other:?}"),
    }
    match &declarations[8].resource {
        Resource::DnsSearchPaths(paths) => assert_eq!(paths.search_paths, vec!["tsk"]),
        other => panic!("expected search paths, got {other:?}"),
    }

    assert_eq!(ctx.outputs()["dnsConfigured"], json!(true));
}

#[tokio::test]
async fn scenario_no_device_leaves_dns_unconfigured() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();

    let mut ctx = RecordingContext::new(Arc::new(FakeRegistry::default()));
    TskProgram::new(config).run(&mut ctx).await.unwrap();

    assert_eq!(ctx.graph().len(), 6);
    assert_eq!(ctx.outputs()["dnsConfigured"], json!(false));
}

#[tokio::test]
async fn scenario_missing_ephemeral_key_is_rejected_before_any_declaration() {
    let dir = TempDir::new().unwrap();
    let mut settings = node1_settings(dir.path());
    settings.ephemeral_key = String::new();

    let err = settings.validate().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingField {
            field: "Tailscale Ephemeral Key",
            ..
        }
    ));
    assert!(err.to_string().contains("TSK_EPHEMERAL_KEY"));
}

// ============================================================================
// Stack lifecycle
// ============================================================================

#[tokio::test]
async fn lifecycle_up_until_registered_then_down() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let registry = Arc::new(FakeRegistry::default());
    let stack = get_stack(&config)
        .await
        .unwrap()
        .with_providers(fake_providers(&provider, &registry));

    // First deploy: the device has not registered yet.
    let first = stack.up().await.unwrap();
    assert!(!first.dns_configured());
    assert_eq!(first.summary.created, 6);
    assert_eq!(provider.live_count(), 6);

    // The node joins the tailnet; the next run wires DNS.
    registry.register(device("1", "node1.example.ts.net", "100.64.0.1"));
    let plan = stack.preview(false).await.unwrap();
    assert_eq!(plan.steps.iter().filter(|s| s.op.to_string() == "create").count(), 3);

    let second = stack.up().await.unwrap();
    assert!(second.dns_configured());
    assert_eq!(second.summary.created, 3);
    assert_eq!(second.summary.same, 6);
    assert_eq!(provider.live_count(), 9);

    // Re-running converges without touching anything.
    provider.clear_calls();
    let third = stack.up().await.unwrap();
    assert!(third.dns_configured());
    assert_eq!(third.summary.changes(), 0);
    assert!(provider.calls().is_empty());

    let exported = stack.export().await.unwrap();
    assert_eq!(exported.resources.len(), 9);
    assert_eq!(exported.outputs["dnsConfigured"], json!(true));
    assert!(!exported.to_pretty_json().unwrap().contains("\"k\""));

    // Tear down: tailnet settings go first, the service account last.
    provider.clear_calls();
    let summary = stack.destroy().await.unwrap();
    assert_eq!(summary.deleted, 9);
    let calls = provider.calls();
    assert!(calls[0].starts_with("delete tailscale:index/dnsSearchPaths"));
    assert!(calls[8].starts_with("delete kubernetes:core/v1:ServiceAccount"));
    assert_eq!(provider.live_count(), 0);
    assert!(stack.export().await.unwrap().resources.is_empty());
}

#[tokio::test]
async fn lifecycle_partial_mesh_failure_recovers_on_rerun() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let registry = Arc::new(FakeRegistry::with(vec![device(
        "1",
        "node1.example.ts.net",
        "100.64.0.1",
    )]));
    let stack = get_stack(&config)
        .await
        .unwrap()
        .with_providers(fake_providers(&provider, &registry));

    provider.fail_on("tailscale:index/dnsNameservers:DnsNameservers");
    let err = stack.up().await.unwrap_err();
    assert!(format!("{err:#}").contains("couldn't register DNS nameservers"));

    // Routes were realized before the failure and are recorded.
    let state = stack.export().await.unwrap();
    assert_eq!(state.resources.len(), 7);
    assert!(state.outputs.is_empty());

    provider.heal();
    provider.clear_calls();
    let result = stack.up().await.unwrap();
    assert!(result.dns_configured());
    assert_eq!(result.summary.created, 2);
    assert_eq!(result.summary.same, 7);
    assert_eq!(provider.live_count(), 9);
    assert!(!provider
        .calls()
        .iter()
        .any(|c| c.contains("deviceSubnetRoutes")));
}

#[tokio::test]
async fn lifecycle_interrupted_up_is_fully_destroyed() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let registry = Arc::new(FakeRegistry::with(vec![device(
        "1",
        "node1.example.ts.net",
        "100.64.0.1",
    )]));
    let stack = get_stack(&config)
        .await
        .unwrap()
        .with_providers(fake_providers(&provider, &registry));

    // Interrupted while the search paths are being registered, as Ctrl-C would.
    provider.stall_on("tailscale:index/dnsSearchPaths:DnsSearchPaths");
    let interrupted = tokio::time::timeout(Duration::from_millis(500), stack.up()).await;
    assert!(interrupted.is_err());
    assert_eq!(provider.live_count(), 8);
    assert_eq!(stack.export().await.unwrap().resources.len(), 8);

    provider.heal();
    let summary = stack.destroy().await.unwrap();
    assert_eq!(summary.deleted, 8);
    assert_eq!(provider.live_count(), 0);
    assert!(stack.export().await.unwrap().resources.is_empty());
}

#[tokio::test]
async fn lifecycle_refresh_forgets_deleted_objects() {
    let dir = TempDir::new().unwrap();
    let config = node1_settings(dir.path()).validate().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let registry = Arc::new(FakeRegistry::default());
    let stack = get_stack(&config)
        .await
        .unwrap()
        .with_providers(fake_providers(&provider, &registry));

    stack.up().await.unwrap();

    // Something outside tsk removed the ConfigMap.
    let state = stack.export().await.unwrap();
    let configmap = state
        .resources
        .iter()
        .find(|e| e.kind == ResourceKind::ConfigMap)
        .unwrap()
        .clone();
    tsk::engine::Provider::delete(provider.as_ref(), &configmap)
        .await
        .unwrap();

    let summary = stack.refresh().await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(stack.export().await.unwrap().resources.len(), 5);

    // The next update recreates it.
    let result = stack.up().await.unwrap();
    assert_eq!(result.summary.created, 1);
    assert_eq!(provider.live_count(), 6);
}
