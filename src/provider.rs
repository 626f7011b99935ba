// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The provider adapter contract.
//!
//! Every vendor integration implements [`Provider`]. The backend session drives it
//! strictly sequentially for one logical load balancer, so implementations take
//! `&mut self` and may keep per-session state (an open transaction, a cached monitor).
//!
//! # Lifecycle
//!
//! 1. A [`ProviderConstructor`] builds the adapter from a [`ProviderConfig`] and
//!    [`Credentials`].
//! 2. [`Provider::connect`] is called once before any other method.
//! 3. Get/Create/Edit/Delete calls follow.
//! 4. [`Provider::close`] is called once. Non-transactional adapters apply each
//!    call immediately and treat `close` as a final save. Transactional adapters
//!    stage every mutation under one transaction opened by `connect` and commit it
//!    in `close`, or discard it if anything failed.
//!
//! # Lookups
//!
//! `get_*` methods return `Ok(None)` when the resource does not exist on the
//! appliance; any other failure is an error.

use crate::errors::ProviderError;
use crate::model::{Credentials, Monitor, Pool, PoolMember, ProviderConfig, Vip};
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for adapter calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Builds an unconnected provider instance.
pub type ProviderConstructor =
    Arc<dyn Fn(&ProviderConfig, &Credentials) -> ProviderResult<Box<dyn Provider>> + Send + Sync>;

/// Vendor adapter translating the resource model into appliance API calls.
#[async_trait]
pub trait Provider: Send {
    /// Open the connection. Transactional adapters also open their staged-change
    /// context here.
    async fn connect(&mut self) -> ProviderResult<()>;

    /// Finish the session. Transactional adapters commit, or roll back when any
    /// staged call failed.
    async fn close(&mut self) -> ProviderResult<()>;

    async fn get_monitor(&mut self, name: &str) -> ProviderResult<Option<Monitor>>;
    async fn create_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor>;
    async fn edit_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor>;
    async fn delete_monitor(&mut self, monitor: &Monitor) -> ProviderResult<()>;

    /// Fetch a pool. The returned pool's `members` may be empty; callers that need
    /// the live member list use [`Provider::get_pool_members`].
    async fn get_pool(&mut self, name: &str) -> ProviderResult<Option<Pool>>;
    async fn create_pool(&mut self, pool: &Pool) -> ProviderResult<Pool>;
    async fn edit_pool(&mut self, pool: &Pool) -> ProviderResult<Pool>;
    async fn delete_pool(&mut self, pool: &Pool) -> ProviderResult<()>;

    async fn get_pool_members(&mut self, pool: &Pool) -> ProviderResult<Vec<PoolMember>>;
    async fn create_pool_member(
        &mut self,
        member: &PoolMember,
        pool: &Pool,
    ) -> ProviderResult<PoolMember>;
    async fn delete_pool_member(&mut self, member: &PoolMember, pool: &Pool) -> ProviderResult<()>;

    async fn get_vip(&mut self, name: &str) -> ProviderResult<Option<Vip>>;
    async fn create_vip(&mut self, vip: &Vip) -> ProviderResult<Vip>;
    async fn edit_vip(&mut self, vip: &Vip) -> ProviderResult<Vip>;
    async fn delete_vip(&mut self, vip: &Vip) -> ProviderResult<()>;
}
