// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Vendor-neutral load balancer resource model.
//!
//! These are value objects: they carry no identity beyond their `name` field, are
//! rebuilt on every reconcile pass and are only ever compared against what a
//! provider reports as live on the appliance, never against a previous in-memory copy.
//!
//! # Example
//!
//! ```rust
//! use lbsync::model::{Monitor, MonitorType, Node, Pool, PoolMember};
//!
//! let monitor = Monitor {
//!     name: "Monitor-default-web".to_string(),
//!     path: "/healthz".to_string(),
//!     port: 30080,
//!     monitor_type: MonitorType::Http,
//! };
//!
//! let pool = Pool {
//!     name: "Pool-default-web-80".to_string(),
//!     monitor_name: monitor.name.clone(),
//!     members: vec![PoolMember::new(Node::new("node-a", "10.0.0.1"), 30080)],
//! };
//! assert_eq!(pool.members.len(), 1);
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Health check protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    #[default]
    Http,
    Https,
    Tcp,
    Udp,
    Icmp,
}

impl MonitorType {
    /// All monitor types, in the order adapters probe them.
    pub const ALL: [MonitorType; 5] = [
        MonitorType::Http,
        MonitorType::Https,
        MonitorType::Tcp,
        MonitorType::Udp,
        MonitorType::Icmp,
    ];

    /// Lowercase protocol name (`http`, `https`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Https => "https",
            MonitorType::Tcp => "tcp",
            MonitorType::Udp => "udp",
            MonitorType::Icmp => "icmp",
        }
    }

    /// Parse a protocol name case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Whether the check sends an HTTP request line.
    #[must_use]
    pub fn is_http(self) -> bool {
        matches!(self, MonitorType::Http | MonitorType::Https)
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check definition polled by the appliance against pool members.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    /// Caller-assigned name, unique within a vendor partition.
    pub name: String,
    /// HTTP path requested by `http`/`https` checks.
    #[serde(default)]
    pub path: String,
    /// Destination port of the check. `0` means "the member's own port".
    #[serde(default)]
    pub port: u16,
    /// Check protocol.
    #[serde(default)]
    pub monitor_type: MonitorType,
}

impl Monitor {
    /// Returns `true` when `live` differs from `self` in any field the appliance
    /// must be told about (`port`, `path` or `monitor_type`). The name is identity
    /// and is not compared.
    #[must_use]
    pub fn differs_from(&self, live: &Monitor) -> bool {
        self.port != live.port || self.path != live.path || self.monitor_type != live.monitor_type
    }
}

/// A cluster host that can receive traffic.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Kubernetes node name.
    pub name: String,
    /// Routable address of the node.
    pub host: String,
    /// Node labels, as reported by the cluster.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// Identity of a pool member: `(host, port)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl fmt::Display for MemberKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One backend target of a [`Pool`].
///
/// Equality and hashing use `(node.host, port)` only. Two members pointing at the
/// same address and port are the same member even if the node was renamed.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub node: Node,
    pub port: u16,
}

impl PoolMember {
    #[must_use]
    pub fn new(node: Node, port: u16) -> Self {
        Self { node, port }
    }

    /// Identity key of this member.
    #[must_use]
    pub fn key(&self) -> MemberKey<'_> {
        MemberKey {
            host: &self.node.host,
            port: self.port,
        }
    }
}

impl PartialEq for PoolMember {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PoolMember {}

impl Hash for PoolMember {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for PoolMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key().fmt(f)
    }
}

/// Named group of backend targets, watched by a [`Monitor`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    /// Name of the monitor bound to this pool. Must have been reconciled first.
    #[serde(default)]
    pub monitor_name: String,
    #[serde(default)]
    pub members: Vec<PoolMember>,
}

/// Virtual listener forwarding `ip:port` to a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vip {
    pub name: String,
    pub ip: String,
    pub port: u16,
    /// Pool receiving the traffic. Must exist when the VIP is created or edited.
    pub pool_name: String,
}

impl Vip {
    /// Returns `true` when `live` differs in `port`, `ip` or `pool_name`.
    #[must_use]
    pub fn differs_from(&self, live: &Vip) -> bool {
        self.port != live.port || self.ip != live.ip || self.pool_name != live.pool_name
    }
}

/// Connection settings for a vendor appliance.
///
/// Opaque to the backend session beyond `vendor`; handed verbatim to the
/// provider constructor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Registered vendor name (case-insensitive), e.g. `f5`, `citrix`, `haproxy`.
    pub vendor: String,
    /// Management address of the appliance, optionally with a scheme.
    pub host: String,
    /// Management port; each vendor has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Administrative partition, for vendors that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// Verify the appliance's TLS certificate.
    #[serde(default = "default_validate_certs")]
    pub validate_certs: bool,
    /// Vendor-specific balancing algorithm name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_method: Option<String>,
    /// Log request and response bodies.
    #[serde(default)]
    pub debug: bool,
}

fn default_validate_certs() -> bool {
    true
}

/// Username/password pair for the appliance's management API.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Last-known state applied to an appliance, as persisted by the caller.
///
/// Cleanup works from this snapshot alone; it never rebuilds desired state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Monitor>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub vips: Vec<Vip>,
}

impl LoadBalancerStatus {
    /// `true` when the snapshot references nothing on the appliance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
            && self.vips.is_empty()
            && self.monitor.as_ref().is_none_or(|m| m.name.is_empty())
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
