// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! F5 BIG-IP provider (iControl REST).
//!
//! Every call is applied immediately to the running configuration; `close` saves
//! it. Objects live in one administrative partition and are addressed as
//! `~{partition}~{name}`.
//!
//! | Model | iControl REST |
//! |-------|---------------|
//! | Monitor | `ltm/monitor/{type}` |
//! | Pool | `ltm/pool` (monitor bound with a follow-up `PUT`) |
//! | PoolMember | `ltm/pool/~p~{pool}/members`, named `host:port` |
//! | VIP | `ltm/virtual` with SNAT automap and the `fastL4` profile |

use crate::constants::{
    F5_API_PREFIX, F5_DEFAULT_LB_METHOD, F5_DEFAULT_PARTITION, F5_DEFAULT_PORT,
    F5_MONITOR_INTERVAL_SECS, F5_MONITOR_TIMEOUT_SECS, F5_VIRTUAL_PROFILE,
};
use crate::errors::ProviderError;
use crate::http::{build_base_url, Auth, RestClient};
use crate::model::{Credentials, Monitor, MonitorType, Node, Pool, PoolMember, ProviderConfig, Vip};
use crate::provider::{Provider, ProviderConstructor, ProviderResult};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MonitorBody<'a> {
    name: &'a str,
    partition: &'a str,
    defaults_from: String,
    interval: u32,
    timeout: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    send: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorRecord {
    name: String,
    #[serde(default)]
    send: Option<String>,
    #[serde(default)]
    destination: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolRecord {
    name: String,
    #[serde(default)]
    monitor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberRecord {
    name: String,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VirtualRecord {
    name: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    pool: Option<String>,
}

/// Collection name of a monitor type under `ltm/monitor`.
#[must_use]
pub fn monitor_collection(monitor_type: MonitorType) -> &'static str {
    match monitor_type {
        MonitorType::Http => "http",
        MonitorType::Https => "https",
        MonitorType::Tcp => "tcp",
        MonitorType::Udp => "udp",
        MonitorType::Icmp => "gateway-icmp",
    }
}

/// Last component of an F5 full path (`/Common/Pool-x ` → `Pool-x`).
#[must_use]
pub fn strip_partition(full_path: &str) -> &str {
    let first = full_path.split_whitespace().next().unwrap_or_default();
    first.rsplit('/').next().unwrap_or(first)
}

/// Virtual server destination for an address and port. IPv6 addresses use `.`
/// as the port separator.
#[must_use]
pub fn format_destination(ip: &str, port: u16) -> String {
    if ip.contains(':') {
        format!("{ip}.{port}")
    } else {
        format!("{ip}:{port}")
    }
}

/// Parse a destination such as `/Common/10.0.0.1:80` or `2001:db8::1.443`.
#[must_use]
pub fn parse_destination(destination: &str) -> Option<(String, u16)> {
    let address = strip_partition(destination);
    let (ip, port) = match address.rsplit_once(':') {
        Some((ip, port)) if !ip.contains(':') => (ip, port),
        _ => address.rsplit_once('.')?,
    };
    Some((ip.to_string(), port.parse().ok()?))
}

/// Port of a monitor destination (`*.8080`, `*:8080`); `0` for `*` or `*:*`.
fn parse_monitor_port(destination: Option<&str>) -> u16 {
    destination
        .and_then(|d| d.rsplit(['.', ':']).next())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0)
}

/// Request path of an HTTP send string (`GET /healthz HTTP/1.1\r\n` → `/healthz`).
fn parse_send_path(send: Option<&str>) -> String {
    send.and_then(|s| s.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

/// Provider for F5 BIG-IP appliances.
#[derive(Debug)]
pub struct F5Provider {
    client: RestClient,
    partition: String,
    lb_method: String,
    connected: bool,
}

impl F5Provider {
    /// Build an unconnected provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfiguration`] for an unusable host.
    pub fn new(config: &ProviderConfig, credentials: &Credentials) -> ProviderResult<Self> {
        let base = build_base_url(
            &config.host,
            config.port,
            "https",
            F5_DEFAULT_PORT,
            F5_API_PREFIX,
        )?;
        let auth = Auth::Basic {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        Ok(Self {
            client: RestClient::new(base, auth, config.validate_certs, config.debug)?,
            partition: config
                .partition
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| F5_DEFAULT_PARTITION.to_string()),
            lb_method: config
                .load_balancing_method
                .clone()
                .unwrap_or_else(|| F5_DEFAULT_LB_METHOD.to_string()),
            connected: false,
        })
    }

    #[must_use]
    pub fn constructor() -> ProviderConstructor {
        Arc::new(|config: &ProviderConfig, credentials: &Credentials| {
            Ok(Box::new(F5Provider::new(config, credentials)?) as Box<dyn Provider>)
        })
    }

    fn object(&self, name: &str) -> String {
        format!("~{}~{}", self.partition, name)
    }

    fn full_path(&self, name: &str) -> String {
        format!("/{}/{}", self.partition, name)
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }

    fn monitor_body<'a>(&'a self, monitor: &'a Monitor) -> MonitorBody<'a> {
        MonitorBody {
            name: &monitor.name,
            partition: &self.partition,
            defaults_from: self.full_path(monitor_collection(monitor.monitor_type)),
            interval: F5_MONITOR_INTERVAL_SECS,
            timeout: F5_MONITOR_TIMEOUT_SECS,
            send: monitor
                .monitor_type
                .is_http()
                .then(|| format!("GET {}", monitor.path)),
            destination: (monitor.port != 0).then(|| format!("*.{}", monitor.port)),
        }
    }

    /// Find a monitor by name across every monitor type collection.
    async fn find_monitor(&self, name: &str) -> ProviderResult<Option<Monitor>> {
        for monitor_type in MonitorType::ALL {
            let url = self.client.url(
                &format!("ltm/monitor/{}/{}", monitor_collection(monitor_type), self.object(name)),
                &[],
            )?;
            if let Some(record) = self.client.get_json::<MonitorRecord>(url).await? {
                return Ok(Some(Monitor {
                    name: record.name,
                    path: parse_send_path(record.send.as_deref()),
                    port: parse_monitor_port(record.destination.as_deref()),
                    monitor_type,
                }));
            }
        }
        Ok(None)
    }

    async fn delete_object(&self, path: &str) -> ProviderResult<()> {
        let url = self.client.url(path, &[])?;
        match self.client.send::<()>(Method::DELETE, url, None).await {
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "Object already absent");
                Ok(())
            }
            other => other,
        }
    }

    /// Live members of `pool`. A member's node name is its iControl name, e.g.
    /// `web1:30080`, and its host the member address without route domain.
    async fn fetch_members(&self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        let url = self
            .client
            .url(&format!("ltm/pool/{}/members", self.object(&pool.name)), &[])?;
        let Some(collection) = self.client.get_json::<Collection<MemberRecord>>(url).await? else {
            return Ok(Vec::new());
        };

        collection
            .items
            .into_iter()
            .map(|record| {
                let (address, port) = parse_destination(&record.name).ok_or_else(|| {
                    ProviderError::MalformedResponse {
                        url: format!("ltm/pool/{}/members", self.object(&pool.name)),
                        reason: format!("unparseable member name '{}'", record.name),
                    }
                })?;
                // Route domains are appended as `%id`.
                let host = record
                    .address
                    .as_deref()
                    .and_then(|a| a.split('%').next())
                    .filter(|a| !a.is_empty())
                    .map_or(address, str::to_string);
                Ok(PoolMember::new(Node::new(record.name, host), port))
            })
            .collect()
    }

    async fn bind_monitor(&self, pool: &Pool) -> ProviderResult<()> {
        let url = self
            .client
            .url(&format!("ltm/pool/{}", self.object(&pool.name)), &[])?;
        let monitor = if pool.monitor_name.is_empty() {
            String::new()
        } else {
            self.full_path(&pool.monitor_name)
        };
        self.client
            .send(Method::PUT, url, Some(&json!({ "monitor": monitor })))
            .await
    }
}

#[async_trait]
impl Provider for F5Provider {
    async fn connect(&mut self) -> ProviderResult<()> {
        let url = self.client.url("sys/version", &[])?;
        self.client.send::<()>(Method::GET, url, None).await?;
        self.connected = true;
        info!(base_url = %self.client.base_url(), partition = %self.partition, "Connected to F5 BIG-IP");
        Ok(())
    }

    async fn close(&mut self) -> ProviderResult<()> {
        if !self.connected {
            return Ok(());
        }
        let url = self.client.url("sys/config", &[])?;
        self.client
            .send(Method::POST, url, Some(&json!({ "command": "save" })))
            .await?;
        self.connected = false;
        Ok(())
    }

    async fn get_monitor(&mut self, name: &str) -> ProviderResult<Option<Monitor>> {
        self.ensure_connected()?;
        self.find_monitor(name).await
    }

    async fn create_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        let url = self.client.url(
            &format!("ltm/monitor/{}", monitor_collection(monitor.monitor_type)),
            &[],
        )?;
        self.client
            .send(Method::POST, url, Some(&self.monitor_body(monitor)))
            .await?;
        Ok(monitor.clone())
    }

    async fn edit_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        match self.find_monitor(&monitor.name).await? {
            Some(live) if live.monitor_type == monitor.monitor_type => {
                let url = self.client.url(
                    &format!(
                        "ltm/monitor/{}/{}",
                        monitor_collection(monitor.monitor_type),
                        self.object(&monitor.name)
                    ),
                    &[],
                )?;
                self.client
                    .send(Method::PATCH, url, Some(&self.monitor_body(monitor)))
                    .await?;
                Ok(monitor.clone())
            }
            Some(live) => {
                // The type of an F5 monitor is fixed at creation.
                self.delete_monitor(&live).await?;
                self.create_monitor(monitor).await
            }
            None => self.create_monitor(monitor).await,
        }
    }

    async fn delete_monitor(&mut self, monitor: &Monitor) -> ProviderResult<()> {
        self.ensure_connected()?;
        let monitor_type = self
            .find_monitor(&monitor.name)
            .await?
            .map_or(monitor.monitor_type, |live| live.monitor_type);
        self.delete_object(&format!(
            "ltm/monitor/{}/{}",
            monitor_collection(monitor_type),
            self.object(&monitor.name)
        ))
        .await
    }

    async fn get_pool(&mut self, name: &str) -> ProviderResult<Option<Pool>> {
        self.ensure_connected()?;
        let url = self.client.url(&format!("ltm/pool/{}", self.object(name)), &[])?;
        Ok(self
            .client
            .get_json::<PoolRecord>(url)
            .await?
            .map(|record| Pool {
                name: record.name,
                monitor_name: record
                    .monitor
                    .as_deref()
                    .map(strip_partition)
                    .unwrap_or_default()
                    .to_string(),
                members: Vec::new(),
            }))
    }

    async fn create_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        let url = self.client.url("ltm/pool", &[])?;
        let body = json!({
            "name": pool.name,
            "partition": self.partition,
            "loadBalancingMode": self.lb_method,
        });
        self.client.send(Method::POST, url, Some(&body)).await?;
        self.bind_monitor(pool).await?;
        Ok(Pool {
            members: Vec::new(),
            ..pool.clone()
        })
    }

    async fn edit_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        self.bind_monitor(pool).await?;
        Ok(pool.clone())
    }

    async fn delete_pool(&mut self, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        self.delete_object(&format!("ltm/pool/{}", self.object(&pool.name)))
            .await
    }

    async fn get_pool_members(&mut self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        self.ensure_connected()?;
        self.fetch_members(pool).await
    }

    async fn create_pool_member(
        &mut self,
        member: &PoolMember,
        pool: &Pool,
    ) -> ProviderResult<PoolMember> {
        self.ensure_connected()?;
        let url = self
            .client
            .url(&format!("ltm/pool/{}/members", self.object(&pool.name)), &[])?;
        let body = json!({
            "name": format_destination(&member.node.host, member.port),
            "partition": self.partition,
            "address": member.node.host,
        });
        self.client.send(Method::POST, url, Some(&body)).await?;
        Ok(member.clone())
    }

    async fn delete_pool_member(&mut self, member: &PoolMember, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        let live = self
            .fetch_members(pool)
            .await?
            .into_iter()
            .find(|live| live == member);
        let Some(live) = live else {
            debug!(pool = %pool.name, member = %member, "Member already absent");
            return Ok(());
        };
        self.delete_object(&format!(
            "ltm/pool/{}/members/{}",
            self.object(&pool.name),
            self.object(&live.node.name)
        ))
        .await
    }

    async fn get_vip(&mut self, name: &str) -> ProviderResult<Option<Vip>> {
        self.ensure_connected()?;
        let url = self
            .client
            .url(&format!("ltm/virtual/{}", self.object(name)), &[])?;
        let Some(record) = self.client.get_json::<VirtualRecord>(url.clone()).await? else {
            return Ok(None);
        };
        let (ip, port) =
            parse_destination(&record.destination).ok_or_else(|| ProviderError::MalformedResponse {
                url: url.to_string(),
                reason: format!("unparseable destination '{}'", record.destination),
            })?;
        Ok(Some(Vip {
            name: record.name,
            ip,
            port,
            pool_name: record
                .pool
                .as_deref()
                .map(strip_partition)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    async fn create_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        let url = self.client.url("ltm/virtual", &[])?;
        let body = json!({
            "name": vip.name,
            "partition": self.partition,
            "destination": format_destination(&vip.ip, vip.port),
            "ipProtocol": "tcp",
            "pool": self.full_path(&vip.pool_name),
            "sourceAddressTranslation": { "type": "automap" },
            "profiles": [ { "name": F5_VIRTUAL_PROFILE } ],
        });
        self.client.send(Method::POST, url, Some(&body)).await?;
        Ok(vip.clone())
    }

    async fn edit_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        let url = self
            .client
            .url(&format!("ltm/virtual/{}", self.object(&vip.name)), &[])?;
        let body = json!({
            "destination": format_destination(&vip.ip, vip.port),
            "pool": self.full_path(&vip.pool_name),
        });
        self.client.send(Method::PATCH, url, Some(&body)).await?;
        Ok(vip.clone())
    }

    async fn delete_vip(&mut self, vip: &Vip) -> ProviderResult<()> {
        self.ensure_connected()?;
        self.delete_object(&format!("ltm/virtual/{}", self.object(&vip.name)))
            .await
    }
}

#[cfg(test)]
#[path = "f5_tests.rs"]
mod f5_tests;
