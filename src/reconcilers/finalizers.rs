// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for namespaced resources.
//!
//! An `ExternalLoadBalancer` owns objects outside the cluster, so Kubernetes must
//! not forget it before the appliance has been cleaned. The finalizer is added on
//! the first reconcile and removed once cleanup succeeded.
//!
//! # Example
//!
//! ```rust,no_run
//! use lbsync::constants::FINALIZER_EXTERNAL_LOAD_BALANCER;
//! use lbsync::crd::ExternalLoadBalancer;
//! use lbsync::reconcilers::finalizers::ensure_finalizer;
//! use kube::Client;
//!
//! async fn reconcile(client: Client, lb: ExternalLoadBalancer) -> anyhow::Result<()> {
//!     ensure_finalizer(&client, &lb, FINALIZER_EXTERNAL_LOAD_BALANCER).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// `true` when `finalizer` is present on `resource`.
#[must_use]
pub fn has_finalizer<T: ResourceExt>(resource: &T, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}

/// Finalizer list of `resource` with `finalizer` appended, or `None` when it is
/// already present.
#[must_use]
pub fn with_finalizer<T: ResourceExt>(resource: &T, finalizer: &str) -> Option<Vec<String>> {
    if has_finalizer(resource, finalizer) {
        return None;
    }
    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list of `resource` without `finalizer`, or `None` when it was absent.
#[must_use]
pub fn without_finalizer<T: ResourceExt>(resource: &T, finalizer: &str) -> Option<Vec<String>> {
    if !has_finalizer(resource, finalizer) {
        return None;
    }
    Some(
        resource
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect(),
    )
}

async fn patch_finalizers<T>(client: &Client, resource: &T, finalizers: Vec<String>) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource
        .namespace()
        .context("cannot patch finalizers of a resource without a namespace")?;
    let name = resource.name_any();

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to patch finalizers of {}/{}", namespace, name))?;
    Ok(())
}

/// Add a finalizer to a resource if not already present.
///
/// # Errors
///
/// Returns an error if the resource has no namespace or the API patch fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let Some(finalizers) = with_finalizer(resource, finalizer) else {
        return Ok(());
    };

    info!(
        "Adding finalizer {} to {}/{} {}",
        finalizer,
        resource.namespace().unwrap_or_default(),
        resource.name_any(),
        T::kind(&())
    );
    patch_finalizers(client, resource, finalizers).await
}

/// Remove a finalizer from a resource if present.
///
/// # Errors
///
/// Returns an error if the resource has no namespace or the API patch fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let Some(finalizers) = without_finalizer(resource, finalizer) else {
        return Ok(());
    };

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    patch_finalizers(client, resource, finalizers).await?;

    info!(
        "Removed finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );
    Ok(())
}
