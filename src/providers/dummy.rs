// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory reference provider.
//!
//! `DummyProvider` applies every call immediately to a [`DummyBackend`], a shared
//! in-memory appliance that also records each call it receives. It is registered
//! as `dummy` for dry runs and is the fake used to verify backend session behaviour.
//!
//! # Example
//!
//! ```rust
//! use lbsync::errors::Operation;
//! use lbsync::providers::dummy::DummyBackend;
//! use lbsync::registry::ProviderRegistry;
//!
//! let backend = DummyBackend::new();
//! backend.fail_on(Operation::CreatePool, "Pool-broken");
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("dummy", backend.constructor()).unwrap();
//! ```

use crate::errors::{Operation, ProviderError};
use crate::model::{Credentials, Monitor, Pool, PoolMember, ProviderConfig, Vip};
use crate::provider::{Provider, ProviderConstructor, ProviderResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One call received by the dummy appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Close,
    /// A resource call; member calls use `host:port` as the resource.
    Apply {
        operation: Operation,
        resource: String,
    },
}

impl Call {
    #[must_use]
    pub fn apply(operation: Operation, resource: impl Into<String>) -> Self {
        Call::Apply {
            operation,
            resource: resource.into(),
        }
    }
}

#[derive(Debug, Default)]
struct DummyState {
    monitors: BTreeMap<String, Monitor>,
    pools: BTreeMap<String, Pool>,
    vips: BTreeMap<String, Vip>,
    calls: Vec<Call>,
    failures: HashSet<(Operation, String)>,
}

/// Shared in-memory appliance.
#[derive(Debug, Clone, Default)]
pub struct DummyBackend {
    state: Arc<Mutex<DummyState>>,
}

impl DummyBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Constructor that builds providers bound to this backend.
    #[must_use]
    pub fn constructor(&self) -> ProviderConstructor {
        let backend = self.clone();
        Arc::new(move |_config: &ProviderConfig, _credentials: &Credentials| {
            Ok(Box::new(DummyProvider::new(backend.clone())) as Box<dyn Provider>)
        })
    }

    /// Make the next and every later `operation` on `resource` fail with HTTP 500.
    pub fn fail_on(&self, operation: Operation, resource: impl Into<String>) {
        self.lock().failures.insert((operation, resource.into()));
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Resource operations received so far, without connect/close.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Apply { operation, .. } => Some(*operation),
                _ => None,
            })
            .collect()
    }

    /// Number of received calls of `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.operations().into_iter().filter(|op| *op == operation).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn insert_monitor(&self, monitor: Monitor) {
        self.lock().monitors.insert(monitor.name.clone(), monitor);
    }

    /// Seed a pool, including its members.
    pub fn insert_pool(&self, pool: Pool) {
        self.lock().pools.insert(pool.name.clone(), pool);
    }

    pub fn insert_vip(&self, vip: Vip) {
        self.lock().vips.insert(vip.name.clone(), vip);
    }

    #[must_use]
    pub fn monitor(&self, name: &str) -> Option<Monitor> {
        self.lock().monitors.get(name).cloned()
    }

    #[must_use]
    pub fn pool(&self, name: &str) -> Option<Pool> {
        self.lock().pools.get(name).cloned()
    }

    #[must_use]
    pub fn vip(&self, name: &str) -> Option<Vip> {
        self.lock().vips.get(name).cloned()
    }

    fn record(&self, operation: Operation, resource: &str) -> ProviderResult<MutexGuard<'_, DummyState>> {
        let mut state = self.lock();
        state.calls.push(Call::apply(operation, resource));
        if state.failures.contains(&(operation, resource.to_string())) {
            return Err(ProviderError::Http {
                method: "DUMMY".to_string(),
                url: format!("dummy://{resource}"),
                status: 500,
                message: format!("injected failure for {operation}"),
            });
        }
        Ok(state)
    }
}

/// Provider bound to a [`DummyBackend`].
#[derive(Debug)]
pub struct DummyProvider {
    backend: DummyBackend,
    connected: bool,
}

impl DummyProvider {
    #[must_use]
    pub fn new(backend: DummyBackend) -> Self {
        Self {
            backend,
            connected: false,
        }
    }

    /// Constructor giving every provider its own empty appliance.
    #[must_use]
    pub fn constructor() -> ProviderConstructor {
        Arc::new(|_config: &ProviderConfig, _credentials: &Credentials| {
            Ok(Box::new(DummyProvider::new(DummyBackend::new())) as Box<dyn Provider>)
        })
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }
}

#[async_trait]
impl Provider for DummyProvider {
    async fn connect(&mut self) -> ProviderResult<()> {
        self.backend.lock().calls.push(Call::Connect);
        self.connected = true;
        debug!("Dummy provider connected");
        Ok(())
    }

    async fn close(&mut self) -> ProviderResult<()> {
        self.backend.lock().calls.push(Call::Close);
        self.connected = false;
        Ok(())
    }

    async fn get_monitor(&mut self, name: &str) -> ProviderResult<Option<Monitor>> {
        self.ensure_connected()?;
        let state = self.backend.record(Operation::GetMonitor, name)?;
        Ok(state.monitors.get(name).cloned())
    }

    async fn create_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::CreateMonitor, &monitor.name)?;
        state.monitors.insert(monitor.name.clone(), monitor.clone());
        Ok(monitor.clone())
    }

    async fn edit_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::EditMonitor, &monitor.name)?;
        state.monitors.insert(monitor.name.clone(), monitor.clone());
        Ok(monitor.clone())
    }

    async fn delete_monitor(&mut self, monitor: &Monitor) -> ProviderResult<()> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::DeleteMonitor, &monitor.name)?;
        state.monitors.remove(&monitor.name);
        Ok(())
    }

    async fn get_pool(&mut self, name: &str) -> ProviderResult<Option<Pool>> {
        self.ensure_connected()?;
        let state = self.backend.record(Operation::GetPool, name)?;
        Ok(state.pools.get(name).map(|pool| Pool {
            members: Vec::new(),
            ..pool.clone()
        }))
    }

    async fn create_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::CreatePool, &pool.name)?;
        let created = Pool {
            members: Vec::new(),
            ..pool.clone()
        };
        state.pools.insert(pool.name.clone(), created.clone());
        Ok(created)
    }

    async fn edit_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::EditPool, &pool.name)?;
        let entry = state.pools.entry(pool.name.clone()).or_default();
        entry.name = pool.name.clone();
        entry.monitor_name = pool.monitor_name.clone();
        Ok(entry.clone())
    }

    async fn delete_pool(&mut self, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::DeletePool, &pool.name)?;
        state.pools.remove(&pool.name);
        Ok(())
    }

    async fn get_pool_members(&mut self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        self.ensure_connected()?;
        let state = self.backend.record(Operation::GetPoolMembers, &pool.name)?;
        Ok(state
            .pools
            .get(&pool.name)
            .map(|p| p.members.clone())
            .unwrap_or_default())
    }

    async fn create_pool_member(
        &mut self,
        member: &PoolMember,
        pool: &Pool,
    ) -> ProviderResult<PoolMember> {
        self.ensure_connected()?;
        let mut state = self
            .backend
            .record(Operation::CreatePoolMember, &member.to_string())?;
        let Some(live) = state.pools.get_mut(&pool.name) else {
            return Err(ProviderError::Http {
                method: "DUMMY".to_string(),
                url: format!("dummy://{}", pool.name),
                status: 404,
                message: format!("pool {} does not exist", pool.name),
            });
        };
        if !live.members.contains(member) {
            live.members.push(member.clone());
        }
        Ok(member.clone())
    }

    async fn delete_pool_member(&mut self, member: &PoolMember, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        let mut state = self
            .backend
            .record(Operation::DeletePoolMember, &member.to_string())?;
        if let Some(live) = state.pools.get_mut(&pool.name) {
            live.members.retain(|m| m != member);
        }
        Ok(())
    }

    async fn get_vip(&mut self, name: &str) -> ProviderResult<Option<Vip>> {
        self.ensure_connected()?;
        let state = self.backend.record(Operation::GetVip, name)?;
        Ok(state.vips.get(name).cloned())
    }

    async fn create_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::CreateVip, &vip.name)?;
        state.vips.insert(vip.name.clone(), vip.clone());
        Ok(vip.clone())
    }

    async fn edit_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::EditVip, &vip.name)?;
        state.vips.insert(vip.name.clone(), vip.clone());
        Ok(vip.clone())
    }

    async fn delete_vip(&mut self, vip: &Vip) -> ProviderResult<()> {
        self.ensure_connected()?;
        let mut state = self.backend.record(Operation::DeleteVip, &vip.name)?;
        state.vips.remove(&vip.name);
        Ok(())
    }
}
