// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backend reconciliation session.
//!
//! A [`BackendSession`] wraps one connected [`Provider`] and converts desired
//! Monitor/Pool/VIP values into the minimal set of adapter calls. Every `handle_*`
//! call first reads the live record from the appliance, so repeated invocations with
//! unchanged input issue no mutating calls.
//!
//! # Lifecycle
//!
//! ```text
//! open() ──► handle_monitor ──► handle_pool (per port) ──► handle_vip (per port) ──► close()
//!   │
//!   └──────► handle_cleanup(last known status) ─────────────────────────────────────► close()
//! ```
//!
//! A session is used by exactly one reconcile pass for one logical load balancer and
//! is never shared. `close` consumes the session; for transactional providers it
//! commits the staged changes as one unit.
//!
//! # Example
//!
//! ```rust
//! use lbsync::backend::BackendSession;
//! use lbsync::model::{Credentials, Monitor, ProviderConfig};
//! use lbsync::providers::default_registry;
//!
//! # async fn example() -> Result<(), lbsync::errors::BackendError> {
//! let registry = default_registry();
//! let config = ProviderConfig {
//!     vendor: "dummy".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut session = BackendSession::open(&registry, &config, &Credentials::default()).await?;
//! session
//!     .handle_monitor(&Monitor {
//!         name: "Monitor-default-web".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::diff::diff_pool_members;
use crate::errors::{BackendError, Operation, ProviderError};
use crate::metrics;
use crate::model::{Credentials, LoadBalancerStatus, Monitor, Pool, ProviderConfig, Vip};
use crate::provider::{Provider, ProviderResult};
use crate::registry::ProviderRegistry;
use std::fmt;
use tracing::{debug, info, warn};

/// A connected provider plus the diff-and-apply logic.
pub struct BackendSession {
    vendor: String,
    provider: Box<dyn Provider>,
}

impl BackendSession {
    /// Look up `config.vendor`, construct the provider and connect it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Registry`] if the vendor is not registered, or
    /// [`BackendError::Connect`] if construction or connection fails.
    pub async fn open(
        registry: &ProviderRegistry,
        config: &ProviderConfig,
        credentials: &Credentials,
    ) -> Result<Self, BackendError> {
        let constructor = registry.lookup(&config.vendor)?;
        let vendor = config.vendor.to_lowercase();

        debug!(vendor = %vendor, host = %config.host, "Creating load balancer provider");
        let provider = constructor(config, credentials).map_err(|source| BackendError::Connect {
            vendor: vendor.clone(),
            source,
        })?;

        Self::connect(vendor, provider).await
    }

    /// Connect an already constructed provider and wrap it in a session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connect`] if the provider fails to connect.
    pub async fn connect(
        vendor: impl Into<String>,
        mut provider: Box<dyn Provider>,
    ) -> Result<Self, BackendError> {
        let vendor = vendor.into();
        provider
            .connect()
            .await
            .map_err(|source| BackendError::Connect {
                vendor: vendor.clone(),
                source,
            })?;

        info!(vendor = %vendor, "Connected to load balancer provider");
        Ok(Self { vendor, provider })
    }

    /// Name of the vendor this session talks to.
    #[must_use]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Finish the session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Commit`] if the provider could not save or commit.
    /// For transactional providers the staged changes have then been discarded.
    pub async fn close(mut self) -> Result<(), BackendError> {
        match self.provider.close().await {
            Ok(()) => {
                info!(vendor = %self.vendor, "Closed load balancer session");
                Ok(())
            }
            Err(source) => Err(BackendError::Commit {
                vendor: self.vendor.clone(),
                source,
            }),
        }
    }

    /// Make the appliance's monitor match `desired`.
    ///
    /// Creates it when missing, edits it when `port`, `path` or `monitor_type`
    /// differ, and otherwise issues no call.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error, wrapped with the operation and monitor name.
    pub async fn handle_monitor(&mut self, desired: &Monitor) -> Result<Monitor, BackendError> {
        let name = desired.name.as_str();
        let existing = self.provider.get_monitor(name).await;
        let Some(existing) = self.track(Operation::GetMonitor, name, existing)? else {
            info!(vendor = %self.vendor, monitor = %name, "Creating monitor");
            let created = self.provider.create_monitor(desired).await;
            return self.track(Operation::CreateMonitor, name, created);
        };

        if desired.differs_from(&existing) {
            info!(vendor = %self.vendor, monitor = %name, "Monitor drifted, editing");
            let edited = self.provider.edit_monitor(desired).await;
            return self.track(Operation::EditMonitor, name, edited);
        }

        debug!(vendor = %self.vendor, monitor = %name, "Monitor up to date");
        Ok(existing)
    }

    /// Make the appliance's pool and its members match `desired`.
    ///
    /// A missing pool is created and every desired member added in list order. An
    /// existing pool is edited only when its monitor reference changed; members are
    /// diffed by `(host, port)`, additions applied before removals.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error, wrapped with the operation and the pool or
    /// member name.
    pub async fn handle_pool(&mut self, desired: &Pool) -> Result<Pool, BackendError> {
        let name = desired.name.as_str();
        let existing = self.provider.get_pool(name).await;
        let Some(mut existing) = self.track(Operation::GetPool, name, existing)? else {
            return self.create_pool(desired).await;
        };

        let live_members = self.provider.get_pool_members(&existing).await;
        existing.members = self.track(Operation::GetPoolMembers, name, live_members)?;

        let diff = diff_pool_members(&existing.members, &desired.members);
        let monitor_changed = desired.monitor_name != existing.monitor_name;

        if !monitor_changed && diff.is_empty() {
            debug!(vendor = %self.vendor, pool = %name, "Pool up to date");
            return Ok(existing);
        }

        if monitor_changed {
            info!(
                vendor = %self.vendor,
                pool = %name,
                from = %existing.monitor_name,
                to = %desired.monitor_name,
                "Pool monitor changed, editing"
            );
            let edited = self.provider.edit_pool(desired).await;
            self.track(Operation::EditPool, name, edited)?;
        }

        for member in &diff.to_add {
            info!(vendor = %self.vendor, pool = %name, member = %member, "Adding pool member");
            let created = self.provider.create_pool_member(member, desired).await;
            self.track(Operation::CreatePoolMember, &member.to_string(), created)?;
        }

        for member in &diff.to_remove {
            info!(vendor = %self.vendor, pool = %name, member = %member, "Removing pool member");
            let deleted = self.provider.delete_pool_member(member, desired).await;
            self.track(Operation::DeletePoolMember, &member.to_string(), deleted)?;
        }

        Ok(desired.clone())
    }

    async fn create_pool(&mut self, desired: &Pool) -> Result<Pool, BackendError> {
        let name = desired.name.as_str();
        info!(
            vendor = %self.vendor,
            pool = %name,
            members = desired.members.len(),
            "Creating pool"
        );

        let created = self.provider.create_pool(desired).await;
        let mut pool = self.track(Operation::CreatePool, name, created)?;
        pool.members.clear();

        for member in &desired.members {
            let created = self.provider.create_pool_member(member, desired).await;
            pool.members
                .push(self.track(Operation::CreatePoolMember, &member.to_string(), created)?);
        }

        Ok(pool)
    }

    /// Make the appliance's VIP match `desired`.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error, wrapped with the operation and VIP name.
    pub async fn handle_vip(&mut self, desired: &Vip) -> Result<Vip, BackendError> {
        let name = desired.name.as_str();
        let existing = self.provider.get_vip(name).await;
        let Some(existing) = self.track(Operation::GetVip, name, existing)? else {
            info!(vendor = %self.vendor, vip = %name, ip = %desired.ip, port = desired.port, "Creating VIP");
            let created = self.provider.create_vip(desired).await;
            return self.track(Operation::CreateVip, name, created);
        };

        if desired.differs_from(&existing) {
            info!(vendor = %self.vendor, vip = %name, "VIP drifted, editing");
            let edited = self.provider.edit_vip(desired).await;
            return self.track(Operation::EditVip, name, edited);
        }

        debug!(vendor = %self.vendor, vip = %name, "VIP up to date");
        Ok(existing)
    }

    /// Tear down everything recorded in `status`.
    ///
    /// Deletes in reverse dependency order: VIPs, then every pool member, then
    /// pools, then the monitor. Member deletion is best-effort: failures are logged
    /// and the loop continues. Every other failure aborts the cleanup.
    ///
    /// # Errors
    ///
    /// Returns the first VIP, pool or monitor deletion error, wrapped with its name.
    pub async fn handle_cleanup(&mut self, status: &LoadBalancerStatus) -> Result<(), BackendError> {
        for vip in &status.vips {
            info!(vendor = %self.vendor, vip = %vip.name, "Deleting VIP");
            let deleted = self.provider.delete_vip(vip).await;
            self.track(Operation::DeleteVip, &vip.name, deleted)?;
        }

        for pool in &status.pools {
            for member in &pool.members {
                info!(vendor = %self.vendor, pool = %pool.name, member = %member, "Deleting pool member");
                let deleted = self.provider.delete_pool_member(member, pool).await;
                if let Err(e) = self.track(Operation::DeletePoolMember, &member.to_string(), deleted) {
                    warn!(
                        vendor = %self.vendor,
                        pool = %pool.name,
                        member = %member,
                        error = %e,
                        "Failed to delete pool member, continuing cleanup"
                    );
                }
            }
        }

        for pool in &status.pools {
            info!(vendor = %self.vendor, pool = %pool.name, "Deleting pool");
            let deleted = self.provider.delete_pool(pool).await;
            self.track(Operation::DeletePool, &pool.name, deleted)?;
        }

        if let Some(monitor) = status.monitor.as_ref().filter(|m| !m.name.is_empty()) {
            info!(vendor = %self.vendor, monitor = %monitor.name, "Deleting monitor");
            let deleted = self.provider.delete_monitor(monitor).await;
            self.track(Operation::DeleteMonitor, &monitor.name, deleted)?;
        }

        Ok(())
    }

    fn track<T>(
        &self,
        operation: Operation,
        resource: &str,
        result: ProviderResult<T>,
    ) -> Result<T, BackendError> {
        metrics::record_backend_operation(&self.vendor, operation.as_str(), result.is_ok());
        result.map_err(|source: ProviderError| BackendError::operation(operation, resource, source))
    }
}

impl fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSession")
            .field("vendor", &self.vendor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod backend_tests;
