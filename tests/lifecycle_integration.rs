// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end lifecycle of an `ExternalLoadBalancer` against the in-memory appliance:
//! registry lookup, desired-state construction, session apply, node churn, port
//! removal and teardown.

mod common;

use common::{apply, external_load_balancer, node, registry};
use lbsync::backend::BackendSession;
use lbsync::desired::DesiredState;
use lbsync::errors::{BackendError, Operation};
use lbsync::model::{Credentials, LoadBalancerStatus};
use lbsync::providers::dummy::{Call, DummyBackend};
use lbsync::reconcilers::externallb::pending_snapshot;

#[tokio::test]
async fn test_first_apply_creates_everything() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let lb = external_load_balancer("web", &[(80, 30080), (443, 30443)]);
    let nodes = vec![node("n1", "10.0.0.1"), node("n2", "10.0.0.2")];

    let desired = DesiredState::build(&lb, &nodes).unwrap();
    let applied = apply(&registry, &lb, &desired, &LoadBalancerStatus::default())
        .await
        .unwrap();

    assert_eq!(backend.count(Operation::CreateMonitor), 1);
    assert_eq!(backend.count(Operation::CreatePool), 2);
    assert_eq!(backend.count(Operation::CreatePoolMember), 4);
    assert_eq!(backend.count(Operation::CreateVip), 2);
    assert_eq!(backend.calls().first(), Some(&Call::Connect));
    assert_eq!(backend.calls().last(), Some(&Call::Close));

    let pool = backend.pool("Pool-default-web-443").unwrap();
    assert_eq!(pool.monitor_name, "Monitor-default-web");
    assert_eq!(pool.members.len(), 2);
    assert_eq!(applied.vips.len(), 2);
    assert!(backend.vip("VIP-default-web-80").is_some());
}

#[tokio::test]
async fn test_second_apply_only_reads() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let lb = external_load_balancer("web", &[(80, 30080)]);
    let nodes = vec![node("n1", "10.0.0.1")];
    let desired = DesiredState::build(&lb, &nodes).unwrap();

    let applied = apply(&registry, &lb, &desired, &LoadBalancerStatus::default())
        .await
        .unwrap();
    backend.clear_calls();
    apply(&registry, &lb, &desired, &applied).await.unwrap();

    assert_eq!(
        backend.operations(),
        vec![
            Operation::GetMonitor,
            Operation::GetPool,
            Operation::GetPoolMembers,
            Operation::GetVip,
        ]
    );
}

#[tokio::test]
async fn test_node_churn_updates_members() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let lb = external_load_balancer("web", &[(80, 30080)]);

    let before = DesiredState::build(&lb, &[node("n1", "10.0.0.1"), node("n2", "10.0.0.2")]).unwrap();
    let applied = apply(&registry, &lb, &before, &LoadBalancerStatus::default())
        .await
        .unwrap();
    backend.clear_calls();

    let after = DesiredState::build(&lb, &[node("n2", "10.0.0.2"), node("n3", "10.0.0.3")]).unwrap();
    apply(&registry, &lb, &after, &applied).await.unwrap();

    assert_eq!(backend.count(Operation::CreatePoolMember), 1);
    assert_eq!(backend.count(Operation::DeletePoolMember), 1);
    assert_eq!(backend.count(Operation::EditPool), 0);

    let hosts: Vec<String> = backend
        .pool("Pool-default-web-80")
        .unwrap()
        .members
        .iter()
        .map(|m| m.node.host.clone())
        .collect();
    assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.3"]);
}

#[tokio::test]
async fn test_removed_port_is_torn_down() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let nodes = vec![node("n1", "10.0.0.1")];

    let both = external_load_balancer("web", &[(80, 30080), (443, 30443)]);
    let applied = apply(
        &registry,
        &both,
        &DesiredState::build(&both, &nodes).unwrap(),
        &LoadBalancerStatus::default(),
    )
    .await
    .unwrap();

    let http_only = external_load_balancer("web", &[(80, 30080)]);
    let applied = apply(
        &registry,
        &http_only,
        &DesiredState::build(&http_only, &nodes).unwrap(),
        &applied,
    )
    .await
    .unwrap();

    assert!(backend.pool("Pool-default-web-443").is_none());
    assert!(backend.vip("VIP-default-web-443").is_none());
    assert!(backend.pool("Pool-default-web-80").is_some());
    assert!(backend.monitor("Monitor-default-web").is_some());
    assert_eq!(applied.pools.len(), 1);
}

#[tokio::test]
async fn test_teardown_from_snapshot() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let lb = external_load_balancer("web", &[(80, 30080), (443, 30443)]);
    let desired = DesiredState::build(&lb, &[node("n1", "10.0.0.1")]).unwrap();
    let applied = apply(&registry, &lb, &desired, &LoadBalancerStatus::default())
        .await
        .unwrap();
    backend.clear_calls();

    let mut session =
        BackendSession::open(&registry, &lb.spec.provider_config(), &Credentials::default())
            .await
            .unwrap();
    session.handle_cleanup(&applied).await.unwrap();
    session.close().await.unwrap();

    assert_eq!(
        backend.operations(),
        vec![
            Operation::DeleteVip,
            Operation::DeleteVip,
            Operation::DeletePoolMember,
            Operation::DeletePoolMember,
            Operation::DeletePool,
            Operation::DeletePool,
            Operation::DeleteMonitor,
        ]
    );
    assert!(backend.monitor("Monitor-default-web").is_none());
    assert!(backend.pool("Pool-default-web-80").is_none());
}

#[tokio::test]
async fn test_partial_failure_snapshot_reaches_created_objects() {
    let backend = DummyBackend::new();
    backend.fail_on(Operation::CreateVip, "VIP-default-web-80");
    let registry = registry(&backend);
    let lb = external_load_balancer("web", &[(80, 30080)]);
    let desired = DesiredState::build(&lb, &[node("n1", "10.0.0.1")]).unwrap();

    let err = apply(&registry, &lb, &desired, &LoadBalancerStatus::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackendError::Operation {
            operation: Operation::CreateVip,
            ..
        }
    ));
    assert!(backend.pool("Pool-default-web-80").is_some());

    let pending = pending_snapshot(&desired, &LoadBalancerStatus::default());
    let mut session =
        BackendSession::open(&registry, &lb.spec.provider_config(), &Credentials::default())
            .await
            .unwrap();
    session.handle_cleanup(&pending).await.unwrap();
    session.close().await.unwrap();

    assert!(backend.pool("Pool-default-web-80").is_none());
    assert!(backend.monitor("Monitor-default-web").is_none());
}

#[tokio::test]
async fn test_unknown_vendor_is_rejected() {
    let backend = DummyBackend::new();
    let registry = registry(&backend);
    let mut lb = external_load_balancer("web", &[(80, 30080)]);
    lb.spec.vendor = "acme".to_string();

    let err = BackendSession::open(&registry, &lb.spec.provider_config(), &Credentials::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Registry(_)));
    assert!(err.to_string().contains("dummy"));
    assert!(backend.calls().is_empty());
}
