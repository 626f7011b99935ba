// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common fixtures for integration tests

use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeCondition, NodeStatus};
use kube::api::ObjectMeta;
use lbsync::backend::BackendSession;
use lbsync::crd::{ExternalLoadBalancer, ExternalLoadBalancerSpec, MonitorSpec, PortSpec};
use lbsync::desired::DesiredState;
use lbsync::errors::BackendError;
use lbsync::model::{Credentials, LoadBalancerStatus};
use lbsync::providers::dummy::DummyBackend;
use lbsync::registry::ProviderRegistry;

/// A `Ready` node with one `InternalIP`
pub fn node(name: &str, address: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        spec: None,
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                type_: "InternalIP".to_string(),
                address: address.to_string(),
            }]),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..NodeCondition::default()
            }]),
            ..NodeStatus::default()
        }),
    }
}

/// An `ExternalLoadBalancer` in `default` exposing `(port, nodePort)` pairs
pub fn external_load_balancer(name: &str, ports: &[(u16, u16)]) -> ExternalLoadBalancer {
    let mut lb = ExternalLoadBalancer::new(
        name,
        ExternalLoadBalancerSpec {
            vendor: "dummy".to_string(),
            host: "lb.example.com".to_string(),
            port: None,
            credentials_secret: "lb-credentials".to_string(),
            partition: None,
            validate_certs: true,
            load_balancing_method: None,
            debug: false,
            ip: "192.0.2.10".to_string(),
            ports: ports
                .iter()
                .map(|(port, node_port)| PortSpec {
                    name: None,
                    port: *port,
                    node_port: *node_port,
                    protocol: None,
                })
                .collect(),
            node_selector: None,
            monitor: MonitorSpec::default(),
        },
    );
    lb.metadata.namespace = Some("default".to_string());
    lb
}

/// Registry whose `dummy` provider is bound to `backend`
pub fn registry(backend: &DummyBackend) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .register("dummy", backend.constructor())
        .expect("fresh registry accepts dummy");
    registry
}

/// Apply `desired` the way a reconcile does and return the applied snapshot
pub async fn apply(
    registry: &ProviderRegistry,
    lb: &ExternalLoadBalancer,
    desired: &DesiredState,
    previous: &LoadBalancerStatus,
) -> Result<LoadBalancerStatus, BackendError> {
    let mut session =
        BackendSession::open(registry, &lb.spec.provider_config(), &Credentials::default()).await?;

    let monitor = session.handle_monitor(&desired.monitor).await?;
    let mut pools = Vec::new();
    for pool in &desired.pools {
        pools.push(session.handle_pool(pool).await?);
    }
    let mut vips = Vec::new();
    for vip in &desired.vips {
        vips.push(session.handle_vip(vip).await?);
    }

    let stale = desired.stale(previous);
    if !stale.is_empty() {
        session.handle_cleanup(&stale).await?;
    }
    session.close().await?;

    Ok(LoadBalancerStatus {
        monitor: Some(monitor),
        pools,
        vips,
    })
}
