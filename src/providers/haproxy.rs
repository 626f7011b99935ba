// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HAProxy provider (Data Plane API v2).
//!
//! The only transactional provider. `connect` opens a [`Transaction`] and every
//! call of the session, reads included, carries its id so that it sees and
//! stages changes in the same context. `close` commits them with one forced
//! reload, or rolls everything back if any call failed.
//!
//! HAProxy has no standalone monitor object. Health checks are attributes of
//! backends (`httpchk`) and servers (`check`, `health_check_port`, `check_ssl`),
//! so the monitor lives in the provider for the session and is folded into each
//! backend and server it writes. Servers whose check attributes no longer match
//! the session monitor are edited when the member list is read.

use crate::constants::{HAPROXY_API_PREFIX, HAPROXY_DEFAULT_LB_METHOD, HAPROXY_DEFAULT_PORT};
use crate::errors::ProviderError;
use crate::http::{build_base_url, Auth, RestClient};
use crate::model::{Credentials, Monitor, MonitorType, Node, Pool, PoolMember, ProviderConfig, Vip};
use crate::provider::{Provider, ProviderConstructor, ProviderResult};
use crate::transaction::{Transaction, TRANSACTION_ID_PARAM};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const ENABLED: &str = "enabled";
const DISABLED: &str = "disabled";

/// Data Plane API response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct BackendRecord {
    name: String,
    #[serde(default)]
    adv_check: Option<String>,
    #[serde(default)]
    httpchk_params: Option<HttpCheckParams>,
}

#[derive(Debug, Deserialize)]
struct HttpCheckParams {
    #[serde(default)]
    uri: String,
}

/// A backend server as the Data Plane API models it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ssl: Option<String>,
}

impl Server {
    /// Server entry for `address:port` with the check attributes of `monitor`.
    #[must_use]
    pub fn new(address: &str, port: u16, monitor: Option<&Monitor>) -> Self {
        let mut server = Self {
            name: server_name(address, port),
            address: address.to_string(),
            port: Some(port),
            ..Self::default()
        };
        server.apply_monitor(monitor);
        server
    }

    fn apply_monitor(&mut self, monitor: Option<&Monitor>) {
        match monitor {
            Some(monitor) => {
                self.check = Some(ENABLED.to_string());
                self.health_check_port = (monitor.port != 0).then_some(monitor.port);
                self.check_ssl = Some(
                    if monitor.monitor_type == MonitorType::Https {
                        ENABLED
                    } else {
                        DISABLED
                    }
                    .to_string(),
                );
            }
            None => {
                self.check = Some(DISABLED.to_string());
                self.health_check_port = None;
                self.check_ssl = None;
            }
        }
    }

    /// Returns `true` when the check attributes differ from what `monitor` implies.
    #[must_use]
    pub fn check_drifted(&self, monitor: Option<&Monitor>) -> bool {
        let checking = self.check.as_deref() == Some(ENABLED);
        let Some(monitor) = monitor else {
            return checking;
        };
        let ssl = self.check_ssl.as_deref() == Some(ENABLED);
        !checking
            || self.health_check_port != (monitor.port != 0).then_some(monitor.port)
            || ssl != (monitor.monitor_type == MonitorType::Https)
    }
}

/// Server name of a member, e.g. `10.0.0.1_30080`. IPv6 colons become `_`.
#[must_use]
pub fn server_name(address: &str, port: u16) -> String {
    format!("{}_{}", address.replace(':', "_"), port)
}

/// Provider for HAProxy with the Data Plane API.
#[derive(Debug)]
pub struct HAProxyProvider {
    client: RestClient,
    lb_method: String,
    transaction: Option<Transaction>,
    monitor: Option<Monitor>,
}

impl HAProxyProvider {
    /// Build an unconnected provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfiguration`] for an unusable host.
    pub fn new(config: &ProviderConfig, credentials: &Credentials) -> ProviderResult<Self> {
        let base = build_base_url(
            &config.host,
            config.port,
            "http",
            HAPROXY_DEFAULT_PORT,
            HAPROXY_API_PREFIX,
        )?;
        let auth = Auth::Basic {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        Ok(Self {
            client: RestClient::new(base, auth, config.validate_certs, config.debug)?,
            lb_method: config
                .load_balancing_method
                .clone()
                .unwrap_or_else(|| HAPROXY_DEFAULT_LB_METHOD.to_string()),
            transaction: None,
            monitor: None,
        })
    }

    #[must_use]
    pub fn constructor() -> ProviderConstructor {
        Arc::new(|config: &ProviderConfig, credentials: &Credentials| {
            Ok(Box::new(HAProxyProvider::new(config, credentials)?) as Box<dyn Provider>)
        })
    }

    /// URL of `path` inside the open transaction.
    fn staged_url(&self, path: &str, query: &[(&str, &str)]) -> ProviderResult<Url> {
        let transaction = self.transaction.as_ref().ok_or(ProviderError::NotConnected)?;
        let mut pairs = query.to_vec();
        pairs.push((TRANSACTION_ID_PARAM, transaction.id()));
        self.client.url(path, &pairs)
    }

    /// Mark the transaction failed when `result` is an error.
    fn staged<T>(&mut self, result: ProviderResult<T>) -> ProviderResult<T> {
        if result.is_err() {
            if let Some(transaction) = self.transaction.as_mut() {
                transaction.mark_failed();
            }
        }
        result
    }

    async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ProviderResult<Option<T>> {
        let url = self.staged_url(path, query)?;
        Ok(self
            .client
            .get_json::<Envelope<T>>(url)
            .await?
            .map(|envelope| envelope.data))
    }

    async fn write<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> ProviderResult<()> {
        let url = self.staged_url(path, query)?;
        self.client.send(method, url, Some(body)).await
    }

    /// Stage a delete; an already absent object counts as deleted.
    async fn remove(&self, path: &str, query: &[(&str, &str)]) -> ProviderResult<()> {
        let url = self.staged_url(path, query)?;
        match self.client.send::<()>(Method::DELETE, url, None).await {
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "Object already absent");
                Ok(())
            }
            other => other,
        }
    }

    fn backend_body(&self, name: &str) -> Value {
        let mut body = json!({
            "name": name,
            "mode": "tcp",
            "balance": { "algorithm": self.lb_method },
        });
        if let Some(monitor) = self.monitor.as_ref().filter(|m| m.monitor_type.is_http()) {
            body["adv_check"] = json!("httpchk");
            body["httpchk_params"] = json!({ "method": "GET", "uri": monitor.path });
        }
        body
    }

    /// Whether a live backend carries the check configuration of the session monitor.
    fn backend_matches_monitor(&self, backend: &BackendRecord) -> bool {
        match self.monitor.as_ref() {
            Some(monitor) if monitor.monitor_type.is_http() => {
                backend.adv_check.as_deref() == Some("httpchk")
                    && backend
                        .httpchk_params
                        .as_ref()
                        .is_some_and(|p| p.uri == monitor.path)
            }
            _ => backend.adv_check.is_none(),
        }
    }

    async fn fetch_pool(&self, name: &str) -> ProviderResult<Option<Pool>> {
        let Some(backend) = self
            .read::<BackendRecord>(&format!("configuration/backends/{name}"), &[])
            .await?
        else {
            return Ok(None);
        };
        let monitor_name = match self.monitor.as_ref() {
            Some(monitor) if self.backend_matches_monitor(&backend) => monitor.name.clone(),
            _ => String::new(),
        };
        Ok(Some(Pool {
            name: backend.name,
            monitor_name,
            members: Vec::new(),
        }))
    }

    async fn fetch_servers(&self, pool: &Pool) -> ProviderResult<Vec<Server>> {
        Ok(self
            .read::<Vec<Server>>("configuration/servers", &[("backend", pool.name.as_str())])
            .await?
            .unwrap_or_default())
    }

    /// Live members of `pool`. Each member's node name is the server's name on the
    /// appliance, which is not necessarily [`server_name`].
    async fn fetch_members(&self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        let servers = self.fetch_servers(pool).await?;

        let mut members = Vec::with_capacity(servers.len());
        for server in servers {
            let Some(port) = server.port else {
                warn!(backend = %pool.name, server = %server.name, "Server has no port, ignoring");
                continue;
            };
            if server.check_drifted(self.monitor.as_ref()) {
                info!(backend = %pool.name, server = %server.name, "Server health check drifted, editing");
                let mut edited = server.clone();
                edited.apply_monitor(self.monitor.as_ref());
                self.write(
                    Method::PUT,
                    &format!("configuration/servers/{}", server.name),
                    &[("backend", pool.name.as_str())],
                    &edited,
                )
                .await?;
            }
            members.push(PoolMember::new(Node::new(server.name, server.address), port));
        }
        Ok(members)
    }

    /// Delete the server of `pool` bound to the member's address and port, whatever
    /// its name.
    async fn remove_member(&self, member: &PoolMember, pool: &Pool) -> ProviderResult<()> {
        let live = self
            .fetch_servers(pool)
            .await?
            .into_iter()
            .find(|s| s.address == member.node.host && s.port == Some(member.port));
        let Some(server) = live else {
            debug!(backend = %pool.name, member = %member, "Server already absent");
            return Ok(());
        };
        self.remove(
            &format!("configuration/servers/{}", server.name),
            &[("backend", pool.name.as_str())],
        )
        .await
    }

    async fn fetch_vip(&self, name: &str) -> ProviderResult<Option<Vip>> {
        let Some(frontend) = self
            .read::<Value>(&format!("configuration/frontends/{name}"), &[])
            .await?
        else {
            return Ok(None);
        };
        let binds = self
            .read::<Vec<Value>>("configuration/binds", &[("frontend", name)])
            .await?
            .unwrap_or_default();
        let bind = binds.first();

        Ok(Some(Vip {
            name: name.to_string(),
            ip: bind
                .and_then(|b| b.get("address"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            port: bind
                .and_then(|b| b.get("port"))
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or_default(),
            pool_name: frontend
                .get("default_backend")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    fn frontend_body(vip: &Vip) -> Value {
        json!({
            "name": vip.name,
            "mode": "tcp",
            "default_backend": vip.pool_name,
        })
    }

    fn bind_body(vip: &Vip) -> Value {
        json!({
            "name": vip.name,
            "address": vip.ip,
            "port": vip.port,
        })
    }

    async fn put_vip(&self, vip: &Vip, method: Method) -> ProviderResult<()> {
        let (frontend_path, bind_path) = if method == Method::POST {
            ("configuration/frontends".to_string(), "configuration/binds".to_string())
        } else {
            (
                format!("configuration/frontends/{}", vip.name),
                format!("configuration/binds/{}", vip.name),
            )
        };
        self.write(method.clone(), &frontend_path, &[], &Self::frontend_body(vip))
            .await?;
        self.write(method, &bind_path, &[("frontend", vip.name.as_str())], &Self::bind_body(vip))
            .await
    }
}

#[async_trait]
impl Provider for HAProxyProvider {
    async fn connect(&mut self) -> ProviderResult<()> {
        let transaction = Transaction::begin(&self.client).await?;
        info!(
            base_url = %self.client.base_url(),
            transaction = %transaction.id(),
            "Connected to HAProxy Data Plane API"
        );
        self.transaction = Some(transaction);
        self.monitor = None;
        Ok(())
    }

    async fn close(&mut self) -> ProviderResult<()> {
        self.monitor = None;
        match self.transaction.take() {
            Some(transaction) => transaction.finish().await,
            None => Ok(()),
        }
    }

    async fn get_monitor(&mut self, name: &str) -> ProviderResult<Option<Monitor>> {
        let result = self
            .staged_url("", &[])
            .map(|_| self.monitor.clone().filter(|m| m.name == name));
        self.staged(result)
    }

    async fn create_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.staged_url("", &[])?;
        debug!(monitor = %monitor.name, "Holding monitor for the session");
        self.monitor = Some(monitor.clone());
        Ok(monitor.clone())
    }

    async fn edit_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.create_monitor(monitor).await
    }

    async fn delete_monitor(&mut self, monitor: &Monitor) -> ProviderResult<()> {
        self.staged_url("", &[])?;
        if self.monitor.as_ref().is_some_and(|m| m.name == monitor.name) {
            self.monitor = None;
        }
        Ok(())
    }

    async fn get_pool(&mut self, name: &str) -> ProviderResult<Option<Pool>> {
        let result = self.fetch_pool(name).await;
        self.staged(result)
    }

    async fn create_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        let body = self.backend_body(&pool.name);
        let result = self
            .write(Method::POST, "configuration/backends", &[], &body)
            .await
            .map(|()| Pool {
                members: Vec::new(),
                ..pool.clone()
            });
        self.staged(result)
    }

    async fn edit_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        let body = self.backend_body(&pool.name);
        let result = self
            .write(
                Method::PUT,
                &format!("configuration/backends/{}", pool.name),
                &[],
                &body,
            )
            .await
            .map(|()| pool.clone());
        self.staged(result)
    }

    async fn delete_pool(&mut self, pool: &Pool) -> ProviderResult<()> {
        let result = self
            .remove(&format!("configuration/backends/{}", pool.name), &[])
            .await;
        self.staged(result)
    }

    async fn get_pool_members(&mut self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        let result = self.fetch_members(pool).await;
        self.staged(result)
    }

    async fn create_pool_member(
        &mut self,
        member: &PoolMember,
        pool: &Pool,
    ) -> ProviderResult<PoolMember> {
        let server = Server::new(&member.node.host, member.port, self.monitor.as_ref());
        let result = self
            .write(
                Method::POST,
                "configuration/servers",
                &[("backend", pool.name.as_str())],
                &server,
            )
            .await
            .map(|()| member.clone());
        self.staged(result)
    }

    async fn delete_pool_member(&mut self, member: &PoolMember, pool: &Pool) -> ProviderResult<()> {
        let result = self.remove_member(member, pool).await;
        self.staged(result)
    }

    async fn get_vip(&mut self, name: &str) -> ProviderResult<Option<Vip>> {
        let result = self.fetch_vip(name).await;
        self.staged(result)
    }

    async fn create_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        let result = self.put_vip(vip, Method::POST).await.map(|()| vip.clone());
        self.staged(result)
    }

    async fn edit_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        let result = self.put_vip(vip, Method::PUT).await.map(|()| vip.clone());
        self.staged(result)
    }

    async fn delete_vip(&mut self, vip: &Vip) -> ProviderResult<()> {
        let result = self
            .remove(&format!("configuration/frontends/{}", vip.name), &[])
            .await;
        self.staged(result)
    }
}

#[cfg(test)]
#[path = "haproxy_tests.rs"]
mod haproxy_tests;
