// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired appliance state for an [`ExternalLoadBalancer`].
//!
//! The monitor, pools and VIPs are derived from the resource spec and the cluster's
//! nodes on every reconcile:
//!
//! | Object | Name | Source |
//! |--------|------|--------|
//! | Monitor | `Monitor-{namespace}-{name}` | `spec.monitor`, port defaults to the first node port |
//! | Pool | `Pool-{namespace}-{name}-{port}` | eligible nodes at the port's node port |
//! | VIP | `VIP-{namespace}-{name}-{port}` | `spec.ip` and the port |
//!
//! A node is eligible when it is `Ready`, schedulable and carries every label of
//! `spec.nodeSelector`. Its address is the first `ExternalIP`, falling back to the
//! first `InternalIP`.

use crate::constants::{DEFAULT_MONITOR_PATH, MONITOR_NAME_PREFIX, POOL_NAME_PREFIX, VIP_NAME_PREFIX};
use crate::crd::{ExternalLoadBalancer, PortSpec};
use crate::model::{LoadBalancerStatus, Monitor, Node, Pool, PoolMember, Vip};
use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Node as KubeNode;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use tracing::{debug, warn};

#[must_use]
pub fn monitor_name(namespace: &str, name: &str) -> String {
    format!("{MONITOR_NAME_PREFIX}-{namespace}-{name}")
}

#[must_use]
pub fn pool_name(namespace: &str, name: &str, port: u16) -> String {
    format!("{POOL_NAME_PREFIX}-{namespace}-{name}-{port}")
}

#[must_use]
pub fn vip_name(namespace: &str, name: &str, port: u16) -> String {
    format!("{VIP_NAME_PREFIX}-{namespace}-{name}-{port}")
}

/// Routable address of a node: first `ExternalIP`, else first `InternalIP`.
#[must_use]
pub fn node_address(node: &KubeNode) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    let first_of = |kind: &str| {
        addresses
            .iter()
            .find(|a| a.type_ == kind && !a.address.is_empty())
            .map(|a| a.address.clone())
    };
    first_of("ExternalIP").or_else(|| first_of("InternalIP"))
}

/// `Ready=True`, schedulable and matching every selector label.
#[must_use]
pub fn is_eligible(node: &KubeNode, selector: Option<&BTreeMap<String, String>>) -> bool {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        });
    let schedulable = !node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    let selected = selector.is_none_or(|selector| {
        let labels = node.labels();
        selector.iter().all(|(k, v)| labels.get(k) == Some(v))
    });
    ready && schedulable && selected
}

/// Eligible nodes with an address, sorted by address.
#[must_use]
pub fn eligible_nodes(nodes: &[KubeNode], selector: Option<&BTreeMap<String, String>>) -> Vec<Node> {
    let mut eligible: Vec<Node> = nodes
        .iter()
        .filter(|node| is_eligible(node, selector))
        .filter_map(|node| {
            let Some(host) = node_address(node) else {
                debug!(node = %node.name_any(), "Skipping node without an address");
                return None;
            };
            Some(Node {
                name: node.name_any(),
                host,
                labels: node.labels().clone(),
            })
        })
        .collect();
    eligible.sort_by(|a, b| a.host.cmp(&b.host).then_with(|| a.name.cmp(&b.name)));
    eligible
}

fn is_forwarded(port: &PortSpec) -> bool {
    port.protocol
        .as_deref()
        .is_none_or(|p| p.eq_ignore_ascii_case("TCP"))
}

/// Everything one `ExternalLoadBalancer` should have on its appliance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub monitor: Monitor,
    pub pools: Vec<Pool>,
    pub vips: Vec<Vip>,
}

impl DesiredState {
    /// Build the desired state of `lb` against the cluster's `nodes`.
    ///
    /// # Errors
    ///
    /// Fails when the resource has no namespace, no TCP port, or an invalid `ip`.
    pub fn build(lb: &ExternalLoadBalancer, nodes: &[KubeNode]) -> Result<Self> {
        let namespace = lb.namespace().context("ExternalLoadBalancer has no namespace")?;
        let name = lb.name_any();
        let spec = &lb.spec;

        spec.ip
            .parse::<IpAddr>()
            .with_context(|| format!("invalid VIP address '{}'", spec.ip))?;

        let ports: Vec<&PortSpec> = spec.ports.iter().filter(|p| is_forwarded(p)).collect();
        for skipped in spec.ports.iter().filter(|p| !is_forwarded(p)) {
            warn!(
                resource = %format!("{namespace}/{name}"),
                port = skipped.port,
                protocol = ?skipped.protocol,
                "Skipping non-TCP port"
            );
        }
        let Some(first) = ports.first() else {
            bail!("ExternalLoadBalancer {namespace}/{name} exposes no TCP port");
        };

        let mut seen = HashSet::new();
        if let Some(duplicate) = ports.iter().find(|p| !seen.insert(p.port)) {
            bail!("port {} is listed more than once", duplicate.port);
        }

        let monitor = Monitor {
            name: monitor_name(&namespace, &name),
            path: spec
                .monitor
                .path
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_MONITOR_PATH.to_string()),
            port: spec.monitor.port.unwrap_or(first.node_port),
            monitor_type: spec.monitor.r#type,
        };

        let nodes = eligible_nodes(nodes, spec.node_selector.as_ref());
        if nodes.is_empty() {
            warn!(resource = %format!("{namespace}/{name}"), "No eligible nodes, pools will be empty");
        }

        let pools = ports
            .iter()
            .map(|port| Pool {
                name: pool_name(&namespace, &name, port.port),
                monitor_name: monitor.name.clone(),
                members: nodes
                    .iter()
                    .map(|node| PoolMember::new(node.clone(), port.node_port))
                    .collect(),
            })
            .collect();

        let vips = ports
            .iter()
            .map(|port| Vip {
                name: vip_name(&namespace, &name, port.port),
                ip: spec.ip.clone(),
                port: port.port,
                pool_name: pool_name(&namespace, &name, port.port),
            })
            .collect();

        Ok(Self {
            monitor,
            pools,
            vips,
        })
    }

    /// Pools and VIPs of `previous` that are no longer desired. The monitor is
    /// never part of the result; it is only removed on deletion.
    #[must_use]
    pub fn stale(&self, previous: &LoadBalancerStatus) -> LoadBalancerStatus {
        let pools: HashSet<&str> = self.pools.iter().map(|p| p.name.as_str()).collect();
        let vips: HashSet<&str> = self.vips.iter().map(|v| v.name.as_str()).collect();
        LoadBalancerStatus {
            monitor: None,
            pools: previous
                .pools
                .iter()
                .filter(|p| !pools.contains(p.name.as_str()))
                .cloned()
                .collect(),
            vips: previous
                .vips
                .iter()
                .filter(|v| !vips.contains(v.name.as_str()))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
