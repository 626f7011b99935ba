// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `externallb.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{
        REASON_CREDENTIALS_UNAVAILABLE, REASON_RECONCILED, REASON_RECONCILE_FAILED,
        REASON_TRANSACTION_ROLLED_BACK, REASON_UNKNOWN_PROVIDER,
    };
    use crate::crd::{Condition, ExternalLoadBalancerStatus};
    use crate::desired::DesiredState;
    use crate::errors::{BackendError, CredentialsError, Operation, ProviderError, RegistryError};
    use crate::model::{LoadBalancerStatus, Monitor, Node, Pool, PoolMember, Vip};
    use crate::reconcilers::externallb::{
        credentials_from_secret, failure_reason, failure_status, pending_snapshot, session_result,
        success_status,
    };
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn secret(data: &[(&str, &[u8])], string_data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("lb-credentials".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            string_data: Some(
                string_data
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Secret::default()
        }
    }

    fn member(host: &str, port: u16) -> PoolMember {
        PoolMember::new(Node::new(host, host), port)
    }

    fn pool(name: &str, members: Vec<PoolMember>) -> Pool {
        Pool {
            name: name.to_string(),
            monitor_name: "Monitor-default-web".to_string(),
            members,
        }
    }

    fn vip(name: &str) -> Vip {
        Vip {
            name: name.to_string(),
            ..Vip::default()
        }
    }

    fn desired() -> DesiredState {
        DesiredState {
            monitor: Monitor {
                name: "Monitor-default-web".to_string(),
                port: 30080,
                ..Monitor::default()
            },
            pools: vec![pool(
                "Pool-default-web-80",
                vec![member("10.0.0.1", 30080)],
            )],
            vips: vec![vip("VIP-default-web-80")],
        }
    }

    fn ready(status: &str, time: &str) -> Condition {
        Condition {
            r#type: "Ready".to_string(),
            status: status.to_string(),
            reason: Some("Whatever".to_string()),
            message: None,
            last_transition_time: Some(time.to_string()),
        }
    }

    // =====================================================
    // Credentials Tests
    // =====================================================

    #[test]
    fn test_credentials_from_data() {
        let secret = secret(&[("username", b"admin"), ("password", b"s3cret")], &[]);

        let credentials = credentials_from_secret(&secret).unwrap();

        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password, "s3cret");
    }

    #[test]
    fn test_credentials_fall_back_to_string_data() {
        let secret = secret(&[("username", b"admin")], &[("password", "plain")]);

        let credentials = credentials_from_secret(&secret).unwrap();

        assert_eq!(credentials.password, "plain");
    }

    #[test]
    fn test_credentials_missing_key() {
        let secret = secret(&[("username", b"admin")], &[]);

        let err = credentials_from_secret(&secret).unwrap_err();

        assert!(matches!(
            err,
            CredentialsError::MissingKey { key: "password", .. }
        ));
    }

    #[test]
    fn test_credentials_invalid_utf8() {
        let secret = secret(&[("username", &[0xff, 0xfe]), ("password", b"x")], &[]);

        let err = credentials_from_secret(&secret).unwrap_err();

        assert!(matches!(
            err,
            CredentialsError::InvalidValue { key: "username", .. }
        ));
    }

    // =====================================================
    // Failure Reason Tests
    // =====================================================

    #[test]
    fn test_unknown_vendor_reason() {
        let err = anyhow::Error::new(BackendError::Registry(RegistryError::NoSuchProvider {
            name: "acme".to_string(),
            available: vec!["dummy".to_string()],
        }));
        assert_eq!(failure_reason(&err), REASON_UNKNOWN_PROVIDER);
    }

    #[test]
    fn test_rollback_reason_survives_context() {
        let rollback = BackendError::Commit {
            vendor: "haproxy".to_string(),
            source: ProviderError::Transaction {
                id: "tx-1".to_string(),
                reason: "server create failed".to_string(),
                rolled_back: true,
            },
        };
        let err = anyhow::Error::new(rollback).context("create_pool_member failed");

        assert_eq!(failure_reason(&err), REASON_TRANSACTION_ROLLED_BACK);
    }

    #[test]
    fn test_credentials_and_generic_reasons() {
        let credentials = anyhow::Error::new(CredentialsError::MissingKey {
            namespace: "default".to_string(),
            name: "lb-credentials".to_string(),
            key: "username",
        });
        assert_eq!(failure_reason(&credentials), REASON_CREDENTIALS_UNAVAILABLE);

        let operation = anyhow::Error::new(BackendError::Operation {
            operation: Operation::CreatePool,
            resource: "Pool-default-web-80".to_string(),
            source: ProviderError::NotConnected,
        });
        assert_eq!(failure_reason(&operation), REASON_RECONCILE_FAILED);
        assert_eq!(failure_reason(&anyhow::anyhow!("no TCP port")), REASON_RECONCILE_FAILED);
    }

    #[test]
    fn test_session_result_labels() {
        assert_eq!(session_result(&Ok(())), "committed");

        let failed = BackendError::Commit {
            vendor: "f5".to_string(),
            source: ProviderError::NotConnected,
        };
        assert_eq!(session_result(&Err(failed)), "failed");
    }

    // =====================================================
    // Snapshot Tests
    // =====================================================

    #[test]
    fn test_pending_snapshot_keeps_previous_objects() {
        let previous = LoadBalancerStatus {
            monitor: None,
            pools: vec![
                pool("Pool-default-web-80", vec![member("10.0.0.9", 30080)]),
                pool("Pool-default-web-8080", vec![member("10.0.0.1", 30081)]),
            ],
            vips: vec![vip("VIP-default-web-8080")],
        };

        let pending = pending_snapshot(&desired(), &previous);

        assert_eq!(pending.monitor.map(|m| m.name).as_deref(), Some("Monitor-default-web"));
        assert_eq!(pending.pools.len(), 2);
        assert_eq!(pending.pools[0].name, "Pool-default-web-80");
        assert_eq!(
            pending.pools[0].members,
            vec![member("10.0.0.1", 30080), member("10.0.0.9", 30080)]
        );
        assert_eq!(pending.pools[1].name, "Pool-default-web-8080");
        assert_eq!(pending.vips.len(), 2);
    }

    #[test]
    fn test_success_status_records_snapshot() {
        let previous = ExternalLoadBalancerStatus {
            conditions: vec![ready("True", "2025-01-01T00:00:00Z")],
            ..ExternalLoadBalancerStatus::default()
        };
        let desired = desired();
        let applied = LoadBalancerStatus {
            monitor: Some(desired.monitor.clone()),
            pools: desired.pools.clone(),
            vips: desired.vips.clone(),
        };

        let status = success_status(&previous, applied, Some(4), "1 pool(s) and 1 VIP(s) in sync");

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.conditions[0].reason.as_deref(), Some(REASON_RECONCILED));
        assert_eq!(
            status.conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.pools, desired.pools);
        assert!(status.last_reconciled_time.is_some());
    }

    #[test]
    fn test_failure_status_flips_ready() {
        let previous = ExternalLoadBalancerStatus {
            conditions: vec![ready("True", "2025-01-01T00:00:00Z")],
            pools: vec![pool("Pool-default-web-80", vec![])],
            last_reconciled_time: Some("2025-01-01T00:00:00Z".to_string()),
            ..ExternalLoadBalancerStatus::default()
        };

        let status = failure_status(&previous, None, Some(2), REASON_UNKNOWN_PROVIDER, "no such provider");

        let condition = &status.conditions[0];
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some(REASON_UNKNOWN_PROVIDER));
        assert_eq!(condition.message.as_deref(), Some("no such provider"));
        assert_ne!(
            condition.last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(status.pools, previous.pools);
        assert_eq!(status.last_reconciled_time, previous.last_reconciled_time);
    }

    #[test]
    fn test_failure_status_takes_pending_snapshot() {
        let pending = pending_snapshot(&desired(), &LoadBalancerStatus::default());

        let status = failure_status(
            &ExternalLoadBalancerStatus::default(),
            Some(pending.clone()),
            None,
            REASON_RECONCILE_FAILED,
            "create_pool failed",
        );

        assert_eq!(status.snapshot(), pending);
    }
}
