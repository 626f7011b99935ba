// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ExternalLoadBalancer` reconciliation.
//!
//! A reconcile reads the appliance credentials, lists the cluster's nodes, builds the
//! desired monitor, pools and VIPs, and applies them through one
//! [`BackendSession`]. Pools and VIPs recorded in the previous status but no longer
//! desired are torn down afterwards. The applied state is written back to the
//! status, where deletion picks it up.
//!
//! Failures are reported as `Ready=False` and returned to the controller, which
//! requeues. Nothing here retries.

use crate::backend::BackendSession;
use crate::constants::{
    FINALIZER_EXTERNAL_LOAD_BALANCER, KIND_EXTERNAL_LOAD_BALANCER, REASON_CREDENTIALS_UNAVAILABLE,
    REASON_RECONCILED, REASON_RECONCILE_FAILED, REASON_TRANSACTION_ROLLED_BACK,
    REASON_UNKNOWN_PROVIDER, SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME,
};
use crate::crd::{ExternalLoadBalancer, ExternalLoadBalancerStatus};
use crate::desired::DesiredState;
use crate::errors::{BackendError, CredentialsError};
use crate::metrics;
use crate::model::{Credentials, LoadBalancerStatus, Pool};
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::status::{patch_status, ready_condition, set_condition};
use crate::registry::ProviderRegistry;
use anyhow::{Context as _, Result};
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state handed to every reconcile.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub registry: Arc<ProviderRegistry>,
}

/// Reconcile one `ExternalLoadBalancer`, or clean it up when it is being deleted.
///
/// # Errors
///
/// Returns the first failure after recording it in the resource's `Ready` condition.
pub async fn reconcile_external_load_balancer(
    ctx: &Context,
    lb: &ExternalLoadBalancer,
) -> Result<()> {
    if lb.metadata.deletion_timestamp.is_some() {
        return match delete_external_load_balancer(ctx, lb).await {
            Ok(()) => Ok(()),
            Err(error) => Err(report_failure(ctx, lb, error, None).await),
        };
    }

    ensure_finalizer(&ctx.client, lb, FINALIZER_EXTERNAL_LOAD_BALANCER).await?;

    let previous = lb.status.clone().unwrap_or_default();
    let snapshot = previous.snapshot();

    let outcome = match prepare(ctx, lb).await {
        Ok((desired, credentials)) => apply(ctx, lb, &desired, &credentials, &snapshot)
            .await
            .map_err(|error| (error, Some(pending_snapshot(&desired, &snapshot)))),
        Err(error) => Err((error, None)),
    };

    let applied = match outcome {
        Ok(applied) => applied,
        Err((error, pending)) => return Err(report_failure(ctx, lb, error, pending).await),
    };

    let message = format!(
        "{} pool(s) and {} VIP(s) in sync on {}",
        applied.pools.len(),
        applied.vips.len(),
        lb.spec.vendor
    );
    let status = success_status(&previous, applied, lb.metadata.generation, &message);
    patch_status(&ctx.client, lb, &status).await?;

    info!(
        resource = %format!("{}/{}", lb.namespace().unwrap_or_default(), lb.name_any()),
        vendor = %lb.spec.vendor,
        "{message}"
    );
    Ok(())
}

/// Tear down everything recorded in the resource's status, then release the finalizer.
///
/// A resource without a status snapshot is released immediately.
///
/// # Errors
///
/// Returns an error if the credentials, the session or any cleanup step fails. The
/// finalizer is then kept and deletion is retried on the next reconcile.
pub async fn delete_external_load_balancer(ctx: &Context, lb: &ExternalLoadBalancer) -> Result<()> {
    if !has_finalizer(lb, FINALIZER_EXTERNAL_LOAD_BALANCER) {
        return Ok(());
    }

    let namespace = lb.namespace().context("ExternalLoadBalancer has no namespace")?;
    let name = lb.name_any();
    let snapshot = lb
        .status
        .as_ref()
        .map(ExternalLoadBalancerStatus::snapshot)
        .unwrap_or_default();

    if snapshot.is_empty() {
        info!("ExternalLoadBalancer {}/{} has nothing applied, releasing", namespace, name);
    } else {
        info!(
            "Cleaning up {} pool(s) and {} VIP(s) of ExternalLoadBalancer {}/{}",
            snapshot.pools.len(),
            snapshot.vips.len(),
            namespace,
            name
        );
        let credentials = read_credentials(&ctx.client, &namespace, &lb.spec.credentials_secret).await?;
        let mut session =
            BackendSession::open(&ctx.registry, &lb.spec.provider_config(), &credentials).await?;
        let cleaned = session.handle_cleanup(&snapshot).await;
        finish(session, cleaned).await?;
    }

    remove_finalizer(&ctx.client, lb, FINALIZER_EXTERNAL_LOAD_BALANCER).await
}

async fn prepare(ctx: &Context, lb: &ExternalLoadBalancer) -> Result<(DesiredState, Credentials)> {
    let namespace = lb.namespace().context("ExternalLoadBalancer has no namespace")?;
    let credentials = read_credentials(&ctx.client, &namespace, &lb.spec.credentials_secret).await?;

    let nodes: Api<Node> = Api::all(ctx.client.clone());
    let nodes = nodes
        .list(&ListParams::default())
        .await
        .context("failed to list nodes")?;
    debug!("Listed {} node(s)", nodes.items.len());

    let desired = DesiredState::build(lb, &nodes.items)?;
    Ok((desired, credentials))
}

async fn apply(
    ctx: &Context,
    lb: &ExternalLoadBalancer,
    desired: &DesiredState,
    credentials: &Credentials,
    previous: &LoadBalancerStatus,
) -> Result<LoadBalancerStatus> {
    let mut session =
        BackendSession::open(&ctx.registry, &lb.spec.provider_config(), credentials).await?;
    let stale = desired.stale(previous);
    let applied = sync(&mut session, desired, &stale).await;
    finish(session, applied).await
}

async fn sync(
    session: &mut BackendSession,
    desired: &DesiredState,
    stale: &LoadBalancerStatus,
) -> Result<LoadBalancerStatus, BackendError> {
    let monitor = session.handle_monitor(&desired.monitor).await?;

    let mut pools = Vec::with_capacity(desired.pools.len());
    for pool in &desired.pools {
        pools.push(session.handle_pool(pool).await?);
    }

    let mut vips = Vec::with_capacity(desired.vips.len());
    for vip in &desired.vips {
        vips.push(session.handle_vip(vip).await?);
    }

    if !stale.is_empty() {
        info!(
            vendor = %session.vendor(),
            pools = stale.pools.len(),
            vips = stale.vips.len(),
            "Removing pools and VIPs that are no longer exposed"
        );
        session.handle_cleanup(stale).await?;
    }

    Ok(LoadBalancerStatus {
        monitor: Some(monitor),
        pools,
        vips,
    })
}

/// Close `session` whatever the outcome of the work done on it.
///
/// A failed close takes precedence so a rolled back transaction stays visible.
async fn finish<T>(session: BackendSession, outcome: Result<T, BackendError>) -> Result<T> {
    let vendor = session.vendor().to_string();
    let closed = session.close().await;
    metrics::record_backend_session(&vendor, session_result(&closed));

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close)) => Err(close.into()),
        (Err(error), Ok(())) => Err(error.into()),
        (Err(error), Err(close)) => Err(anyhow::Error::new(close).context(error.to_string())),
    }
}

async fn report_failure(
    ctx: &Context,
    lb: &ExternalLoadBalancer,
    error: anyhow::Error,
    pending: Option<LoadBalancerStatus>,
) -> anyhow::Error {
    let reason = failure_reason(&error);
    metrics::record_error(KIND_EXTERNAL_LOAD_BALANCER, reason);

    let previous = lb.status.clone().unwrap_or_default();
    let status = failure_status(
        &previous,
        pending,
        lb.metadata.generation,
        reason,
        &format!("{error:#}"),
    );
    if let Err(e) = patch_status(&ctx.client, lb, &status).await {
        warn!("Failed to record reconcile failure in status: {e:#}");
    }
    error
}

async fn read_credentials(client: &Client, namespace: &str, name: &str) -> Result<Credentials> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get(name)
        .await
        .map_err(|source| CredentialsError::Unreadable {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })?;
    Ok(credentials_from_secret(&secret)?)
}

/// Read `username` and `password` from a Secret's `data`, falling back to `stringData`.
///
/// # Errors
///
/// Returns [`CredentialsError`] if a key is missing or its value is not UTF-8.
pub fn credentials_from_secret(secret: &Secret) -> Result<Credentials, CredentialsError> {
    let value = |key: &'static str| -> Result<String, CredentialsError> {
        if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
            return String::from_utf8(bytes.0.clone()).map_err(|_| CredentialsError::InvalidValue {
                namespace: secret.namespace().unwrap_or_default(),
                name: secret.name_any(),
                key,
            });
        }
        secret
            .string_data
            .as_ref()
            .and_then(|data| data.get(key))
            .cloned()
            .ok_or_else(|| CredentialsError::MissingKey {
                namespace: secret.namespace().unwrap_or_default(),
                name: secret.name_any(),
                key,
            })
    };

    Ok(Credentials::new(
        value(SECRET_KEY_USERNAME)?,
        value(SECRET_KEY_PASSWORD)?,
    ))
}

/// Condition reason for a failed reconcile.
#[must_use]
pub fn failure_reason(error: &anyhow::Error) -> &'static str {
    if error.downcast_ref::<CredentialsError>().is_some() {
        return REASON_CREDENTIALS_UNAVAILABLE;
    }
    match error.downcast_ref::<BackendError>() {
        Some(BackendError::Registry(_)) => REASON_UNKNOWN_PROVIDER,
        Some(e) if e.is_rollback() => REASON_TRANSACTION_ROLLED_BACK,
        _ => REASON_RECONCILE_FAILED,
    }
}

/// Metric label for the outcome of closing a session.
#[must_use]
pub fn session_result(closed: &Result<(), BackendError>) -> &'static str {
    match closed {
        Ok(()) => "committed",
        Err(e) if e.is_rollback() => "rolled_back",
        Err(_) => "failed",
    }
}

/// Snapshot recorded when applying failed part-way: everything desired plus
/// everything previously applied, so a later deletion reaches objects that may
/// have been created before the failure.
#[must_use]
pub fn pending_snapshot(desired: &DesiredState, previous: &LoadBalancerStatus) -> LoadBalancerStatus {
    let stale = desired.stale(previous);

    let pools = desired
        .pools
        .iter()
        .map(|pool| {
            let mut merged = pool.clone();
            if let Some(old) = previous.pools.iter().find(|p| p.name == pool.name) {
                for member in &old.members {
                    if !merged.members.contains(member) {
                        merged.members.push(member.clone());
                    }
                }
            }
            merged
        })
        .chain(stale.pools)
        .collect::<Vec<Pool>>();

    LoadBalancerStatus {
        monitor: Some(desired.monitor.clone()),
        pools,
        vips: desired.vips.iter().cloned().chain(stale.vips).collect(),
    }
}

/// Status after a successful reconcile.
#[must_use]
pub fn success_status(
    previous: &ExternalLoadBalancerStatus,
    applied: LoadBalancerStatus,
    generation: Option<i64>,
    message: &str,
) -> ExternalLoadBalancerStatus {
    let mut conditions = previous.conditions.clone();
    set_condition(
        &mut conditions,
        ready_condition(&previous.conditions, true, REASON_RECONCILED, message),
    );

    ExternalLoadBalancerStatus {
        conditions,
        observed_generation: generation,
        monitor: applied.monitor,
        pools: applied.pools,
        vips: applied.vips,
        last_reconciled_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Status after a failed reconcile. The snapshot is replaced only when a
/// `pending` one is given.
#[must_use]
pub fn failure_status(
    previous: &ExternalLoadBalancerStatus,
    pending: Option<LoadBalancerStatus>,
    generation: Option<i64>,
    reason: &str,
    message: &str,
) -> ExternalLoadBalancerStatus {
    let mut status = previous.clone();
    set_condition(
        &mut status.conditions,
        ready_condition(&previous.conditions, false, reason, message),
    );
    status.observed_generation = generation;

    if let Some(pending) = pending {
        status.monitor = pending.monitor;
        status.pools = pending.pools;
        status.vips = pending.vips;
    }
    status
}
