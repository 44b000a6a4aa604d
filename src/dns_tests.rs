// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dns.rs`

#[cfg(test)]
mod tests {
    use crate::config::{Config, KubernetesConfig, TailscaleConfig};
    use crate::dns::{find_matching_device, reconcile_dns};
    use crate::engine::{
        DeclareOptions, RecordingContext, Resource, ResourceHandle, ResourceKind, StackContext,
    };
    use crate::errors::{EngineError, MeshError};
    use crate::resources::declare_node;
    use crate::tailscale::{Device, DeviceRegistry};
    use serde_json::Value;
    use std::sync::Arc;
    use url::Url;

    struct StaticRegistry(Result<Vec<Device>, MeshError>);

    #[async_trait::async_trait]
    impl DeviceRegistry for StaticRegistry {
        async fn list_devices(&self, name_prefix: &str) -> Result<Vec<Device>, MeshError> {
            self.0.clone().map(|devices| {
                devices
                    .into_iter()
                    .filter(|d| d.name.starts_with(name_prefix))
                    .collect()
            })
        }
    }

    /// Records declarations but rejects one resource kind.
    struct RejectingContext {
        inner: RecordingContext,
        reject: ResourceKind,
    }

    #[async_trait::async_trait]
    impl StackContext for RejectingContext {
        async fn declare(
            &mut self,
            name: &str,
            resource: Resource,
            options: DeclareOptions,
        ) -> Result<ResourceHandle, EngineError> {
            if resource.kind() == self.reject {
                return Err(EngineError::Provider {
                    operation: "create",
                    urn: ResourceHandle::new(resource.kind(), name).urn(),
                    source: anyhow::anyhow!("rejected"),
                });
            }
            self.inner.declare(name, resource, options).await
        }

        fn export(&mut self, key: &str, value: Value) {
            self.inner.export(key, value);
        }

        async fn devices(&self, name_prefix: &str) -> Result<Vec<Device>, EngineError> {
            self.inner.devices(name_prefix).await
        }
    }

    fn device(id: &str, name: &str, address: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            addresses: vec![address.into(), "fd7a:115c:a1e0::1".into()],
        }
    }

    fn test_config() -> Config {
        Config {
            backend_url: Url::parse("file:///tmp/tsk/").unwrap(),
            tailscale: TailscaleConfig {
                ephemeral_key: "k".into(),
                api_key: "a".into(),
                tailnet: "example.ts.net".into(),
                hostname: "node1".into(),
            },
            kubernetes: KubernetesConfig {
                username: "alice".into(),
                namespace: "default".into(),
                service_cidr: "10.0.0.0/24".into(),
            },
        }
    }

    fn registry(devices: Vec<Device>) -> Arc<dyn DeviceRegistry> {
        Arc::new(StaticRegistry(Ok(devices)))
    }

    async fn workload(ctx: &mut dyn StackContext, config: &Config) -> ResourceHandle {
        declare_node(ctx, config).await.unwrap().deployment
    }

    #[test]
    fn test_find_matching_device_exact_name() {
        let devices = vec![
            device("10", "node10.example.ts.net", "100.64.0.10"),
            device("2", "node1.other.ts.net", "100.64.0.2"),
            device("1", "node1.example.ts.net", "100.64.0.1"),
        ];
        let found = find_matching_device(&devices, "node1", "example.ts.net").unwrap();
        assert_eq!(found.id, "1");
    }

    #[test]
    fn test_find_matching_device_rejects_prefix_confusion() {
        let devices = vec![
            device("1", "node1x.example.ts.net", "100.64.0.1"),
            device("2", "node1.example.ts.net.evil", "100.64.0.2"),
        ];
        assert!(find_matching_device(&devices, "node1", "example.ts.net").is_none());
        assert!(find_matching_device(&[], "node1", "example.ts.net").is_none());
    }

    #[test]
    fn test_find_matching_device_first_duplicate_wins() {
        let devices = vec![
            device("old", "node1.example.ts.net", "100.64.0.9"),
            device("new", "node1.example.ts.net", "100.64.0.1"),
        ];
        let found = find_matching_device(&devices, "node1", "example.ts.net").unwrap();
        assert_eq!(found.id, "old");
    }

    #[tokio::test]
    async fn test_reconcile_declares_in_order() {
        let config = test_config();
        let mut ctx = RecordingContext::new(registry(vec![device(
            "1",
            "node1.example.ts.net",
            "100.64.0.1",
        )]));
        let workload = workload(&mut ctx, &config).await;

        assert!(reconcile_dns(&mut ctx, &config, &workload).await.unwrap());

        let mesh: Vec<_> = ctx.graph().declarations()[6..].to_vec();
        assert_eq!(mesh.len(), 3);

        match &mesh[0].resource {
            Resource::DeviceSubnetRoutes(routes) => {
                assert_eq!(routes.device_id, "1");
                assert_eq!(routes.routes, vec!["10.0.0.0/24"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mesh[0].options.parent.as_ref(), Some(&workload));

        match &mesh[1].resource {
            Resource::DnsNameservers(ns) => assert_eq!(ns.nameservers, vec!["100.64.0.1"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mesh[1].options.parent.as_ref(), Some(&mesh[0].handle));

        match &mesh[2].resource {
            Resource::DnsSearchPaths(paths) => assert_eq!(paths.search_paths, vec!["tsk"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mesh[2].options.parent.as_ref(), Some(&mesh[1].handle));
        assert_eq!(mesh[2].options.depends_on, vec![mesh[1].handle.clone()]);

        assert!(mesh.iter().all(|d| d.handle.name == "node1.example.ts.net"));
    }

    #[tokio::test]
    async fn test_reconcile_without_device() {
        let config = test_config();
        let mut ctx = RecordingContext::new(registry(vec![device(
            "10",
            "node10.example.ts.net",
            "100.64.0.10",
        )]));
        let workload = workload(&mut ctx, &config).await;

        assert!(!reconcile_dns(&mut ctx, &config, &workload).await.unwrap());
        assert_eq!(ctx.graph().len(), 6);
    }

    #[tokio::test]
    async fn test_reconcile_device_without_address() {
        let config = test_config();
        let mut ctx = RecordingContext::new(registry(vec![Device {
            id: "1".into(),
            name: "node1.example.ts.net".into(),
            addresses: Vec::new(),
        }]));
        let workload = workload(&mut ctx, &config).await;

        assert!(!reconcile_dns(&mut ctx, &config, &workload).await.unwrap());
        assert_eq!(ctx.graph().len(), 6);
    }

    #[tokio::test]
    async fn test_reconcile_query_failure() {
        let config = test_config();
        let mut ctx = RecordingContext::new(Arc::new(StaticRegistry(Err(
            MeshError::UnexpectedStatus {
                endpoint: "devices".into(),
                status_code: 500,
                body: "boom".into(),
            },
        ))));
        let workload = workload(&mut ctx, &config).await;

        let err = reconcile_dns(&mut ctx, &config, &workload).await.unwrap_err();
        assert!(err.to_string().contains("couldn't fetch devices"));
        assert_eq!(ctx.graph().len(), 6);
    }

    async fn reconcile_rejecting(reject: ResourceKind) -> (anyhow::Error, usize) {
        let config = test_config();
        let mut ctx = RejectingContext {
            inner: RecordingContext::new(registry(vec![device(
                "1",
                "node1.example.ts.net",
                "100.64.0.1",
            )])),
            reject,
        };
        let workload = workload(&mut ctx, &config).await;
        let err = reconcile_dns(&mut ctx, &config, &workload).await.unwrap_err();
        (err, ctx.inner.graph().len())
    }

    #[tokio::test]
    async fn test_reconcile_step_failures_are_labelled() {
        let (err, declared) = reconcile_rejecting(ResourceKind::DeviceSubnetRoutes).await;
        assert!(err.to_string().contains("couldn't create subnet routes"));
        assert_eq!(declared, 6);

        let (err, declared) = reconcile_rejecting(ResourceKind::DnsNameservers).await;
        assert!(err.to_string().contains("couldn't register DNS nameservers"));
        assert_eq!(declared, 7);

        let (err, declared) = reconcile_rejecting(ResourceKind::DnsSearchPaths).await;
        assert!(err.to_string().contains("couldn't register DNS search paths"));
        assert_eq!(declared, 8);
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_stable() {
        let config = test_config();
        let registry = registry(vec![device("1", "node1.example.ts.net", "100.64.0.1")]);

        let mut first = RecordingContext::new(registry.clone());
        let workload_a = workload(&mut first, &config).await;
        assert!(reconcile_dns(&mut first, &config, &workload_a).await.unwrap());

        let mut second = RecordingContext::new(registry);
        let workload_b = workload(&mut second, &config).await;
        assert!(reconcile_dns(&mut second, &config, &workload_b).await.unwrap());

        assert_eq!(first.graph().declarations(), second.graph().declarations());
    }
}
