// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for external load balancer management.
//!
//! # Resource Types
//!
//! - [`ExternalLoadBalancer`] - Exposes node ports of the cluster through a VIP on an
//!   external load balancer appliance
//!
//! # Example
//!
//! ```rust,no_run
//! use lbsync::crd::{ExternalLoadBalancerSpec, MonitorSpec, PortSpec};
//!
//! let spec = ExternalLoadBalancerSpec {
//!     vendor: "f5".to_string(),
//!     host: "bigip.example.com".to_string(),
//!     port: None,
//!     credentials_secret: "bigip-credentials".to_string(),
//!     partition: Some("Common".to_string()),
//!     validate_certs: true,
//!     load_balancing_method: None,
//!     debug: false,
//!     ip: "192.0.2.10".to_string(),
//!     ports: vec![PortSpec {
//!         name: Some("http".to_string()),
//!         port: 80,
//!         node_port: 30080,
//!         protocol: None,
//!     }],
//!     node_selector: None,
//!     monitor: MonitorSpec::default(),
//! };
//! ```

use crate::model::{LoadBalancerStatus, Monitor, MonitorType, Pool, ProviderConfig, Vip};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Only `Ready` is reported.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// One exposed service port.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    /// Optional display name of the port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port the VIP listens on.
    pub port: u16,

    /// Node port the traffic is forwarded to on every eligible node.
    pub node_port: u16,

    /// Transport protocol. Only `TCP` is forwarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Health check settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    /// Check protocol (`http`, `https`, `tcp`, `udp`, `icmp`).
    #[serde(default)]
    pub r#type: MonitorType,

    /// Path requested by HTTP checks. Defaults to `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Port probed by the check. Defaults to the node port of the first port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// `ExternalLoadBalancer` publishes node ports through an appliance VIP.
///
/// # Example
///
/// ```yaml
/// apiVersion: lbsync.firestoned.io/v1alpha1
/// kind: ExternalLoadBalancer
/// metadata:
///   name: web
///   namespace: default
/// spec:
///   vendor: haproxy
///   host: haproxy.example.com
///   credentialsSecret: haproxy-dataplane
///   ip: 192.0.2.10
///   ports:
///     - name: http
///       port: 80
///       nodePort: 30080
///   nodeSelector:
///     node-role.kubernetes.io/ingress: "true"
///   monitor:
///     type: http
///     path: /healthz
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "lbsync.firestoned.io",
    version = "v1alpha1",
    kind = "ExternalLoadBalancer",
    namespaced,
    shortname = "elb",
    doc = "ExternalLoadBalancer exposes node ports of the cluster through a virtual IP on an external load balancer appliance (F5 BIG-IP, Citrix ADC or HAProxy).",
    printcolumn = r#"{"name":"Vendor","type":"string","jsonPath":".spec.vendor"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ip"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#
)]
#[kube(status = "ExternalLoadBalancerStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoadBalancerSpec {
    /// Registered provider name (`f5`, `citrix`, `haproxy`, `dummy`).
    pub vendor: String,

    /// Management address of the appliance, optionally with a scheme.
    pub host: String,

    /// Management port. Each vendor has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Name of a Secret in the same namespace with `username` and `password` keys.
    pub credentials_secret: String,

    /// Administrative partition, for vendors that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Verify the appliance's TLS certificate.
    #[serde(default = "default_true")]
    pub validate_certs: bool,

    /// Vendor-specific load balancing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_method: Option<String>,

    /// Log appliance request and response bodies.
    #[serde(default)]
    pub debug: bool,

    /// Virtual IP address.
    pub ip: String,

    /// Exposed ports; one pool and one VIP each.
    pub ports: Vec<PortSpec>,

    /// Only nodes carrying every one of these labels receive traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Health check applied to every pool.
    #[serde(default)]
    pub monitor: MonitorSpec,
}

fn default_true() -> bool {
    true
}

impl ExternalLoadBalancerSpec {
    /// Provider configuration handed to the adapter constructor.
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            vendor: self.vendor.clone(),
            host: self.host.clone(),
            port: self.port,
            partition: self.partition.clone(),
            validate_certs: self.validate_certs,
            load_balancing_method: self.load_balancing_method.clone(),
            debug: self.debug,
        }
    }
}

/// `ExternalLoadBalancer` status: readiness plus the last state applied to the
/// appliance, which is what deletion tears down.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoadBalancerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Monitor>,

    #[serde(default)]
    pub pools: Vec<Pool>,

    #[serde(default)]
    pub vips: Vec<Vip>,

    /// Time of the last successful reconcile that changed the status (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled_time: Option<String>,
}

impl ExternalLoadBalancerStatus {
    /// The applied-state snapshot recorded in this status.
    #[must_use]
    pub fn snapshot(&self) -> LoadBalancerStatus {
        LoadBalancerStatus {
            monitor: self.monitor.clone(),
            pools: self.pools.clone(),
            vips: self.vips.clone(),
        }
    }

    /// The `Ready` condition, if reported.
    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.r#type == crate::constants::CONDITION_TYPE_READY)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
