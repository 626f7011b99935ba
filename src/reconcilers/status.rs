// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `ExternalLoadBalancer`.
//!
//! Conditions follow the Kubernetes conventions:
//! - `type`: only `Ready` is reported
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: a programmatic identifier (CamelCase)
//! - `message`: a human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp of the last status flip
//!
//! # Example
//!
//! ```rust
//! use lbsync::reconcilers::status::create_condition;
//!
//! let condition = create_condition("Ready", "True", "Reconciled", "2 pools, 2 VIPs");
//! assert_eq!(condition.status, "True");
//! ```

use crate::constants::CONDITION_TYPE_READY;
use crate::crd::{Condition, ExternalLoadBalancer, ExternalLoadBalancerStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Create a new condition stamped with the current time.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// `true` when `new_condition` differs from `existing` in type, status, reason or message.
#[must_use]
pub fn condition_changed(existing: Option<&Condition>, new_condition: &Condition) -> bool {
    existing.is_none_or(|current| {
        current.r#type != new_condition.r#type
            || current.status != new_condition.status
            || current.reason != new_condition.reason
            || current.message != new_condition.message
    })
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Build the `Ready` condition, keeping the previous `lastTransitionTime` when
/// the status did not flip.
#[must_use]
pub fn ready_condition(existing: &[Condition], ready: bool, reason: &str, message: &str) -> Condition {
    let status = if ready { "True" } else { "False" };
    let mut condition = create_condition(CONDITION_TYPE_READY, status, reason, message);

    if let Some(previous) = find_condition(existing, CONDITION_TYPE_READY) {
        if previous.status == status && previous.last_transition_time.is_some() {
            condition
                .last_transition_time
                .clone_from(&previous.last_transition_time);
        }
    }
    condition
}

/// Replace the condition of the same type in `conditions`, appending it when absent.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(slot) => *slot = condition,
        None => conditions.push(condition),
    }
}

/// `true` when `new_status` differs from `current` in its snapshot, its
/// `observedGeneration` or its `Ready` condition. `lastReconciledTime` and the
/// condition's `lastTransitionTime` are ignored.
#[must_use]
pub fn status_changed(
    current: Option<&ExternalLoadBalancerStatus>,
    new_status: &ExternalLoadBalancerStatus,
) -> bool {
    let Some(current) = current else {
        return true;
    };
    let ready_changed = match new_status.ready_condition() {
        Some(ready) => condition_changed(current.ready_condition(), ready),
        None => current.ready_condition().is_some(),
    };
    ready_changed
        || current.observed_generation != new_status.observed_generation
        || current.snapshot() != new_status.snapshot()
}

/// Write `status` to the resource's status subresource.
///
/// Skips the write when the status is semantically unchanged. Every write is a
/// watch event on the resource, which would trigger another reconcile.
///
/// # Errors
///
/// Returns an error if the resource has no namespace or the API patch fails.
pub async fn patch_status(
    client: &Client,
    lb: &ExternalLoadBalancer,
    status: &ExternalLoadBalancerStatus,
) -> Result<()> {
    let namespace = lb
        .namespace()
        .context("cannot patch status of a resource without a namespace")?;
    let name = lb.name_any();

    if !status_changed(lb.status.as_ref(), status) {
        debug!(
            "ExternalLoadBalancer {}/{} status unchanged, skipping update",
            namespace, name
        );
        return Ok(());
    }

    let api: Api<ExternalLoadBalancer> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "status": status });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to patch status of {}/{}", namespace, name))?;

    debug!(
        "Updated ExternalLoadBalancer {}/{} status: {} pool(s), {} VIP(s)",
        namespace,
        name,
        status.pools.len(),
        status.vips.len()
    );
    Ok(())
}
