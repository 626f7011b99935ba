// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Citrix ADC provider (Nitro REST API).
//!
//! Nitro wraps every object in an envelope named after its resource type, both
//! on requests (`{"lbmonitor": {...}}`) and on responses (`{"lbmonitor": [...]}`).
//! Pools map to service groups, members to service group member bindings and
//! VIPs to `lbvserver`s bound to their service group. Members reference `server`
//! objects, which are created on demand.
//!
//! Nitro keeps changes in the running configuration only, so every mutating call
//! is followed by `nsconfig?action=save`.

use crate::constants::{CITRIX_API_PREFIX, CITRIX_DEFAULT_LB_METHOD, CITRIX_DEFAULT_PORT};
use crate::errors::ProviderError;
use crate::http::{build_base_url, Auth, RestClient};
use crate::model::{Credentials, Monitor, MonitorType, Node, Pool, PoolMember, ProviderConfig, Vip};
use crate::provider::{Provider, ProviderConstructor, ProviderResult};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const HEADER_USER: &str = "X-NITRO-USER";
const HEADER_PASS: &str = "X-NITRO-PASS";

const MONITOR: &str = "lbmonitor";
const SERVICE_GROUP: &str = "servicegroup";
const MONITOR_BINDING: &str = "servicegroup_lbmonitor_binding";
const MEMBER_BINDING: &str = "servicegroup_servicegroupmember_binding";
const SERVER: &str = "server";
const VSERVER: &str = "lbvserver";
const VSERVER_BINDING: &str = "lbvserver_servicegroup_binding";

/// Nitro monitor type and `secure` flag for a monitor type.
#[must_use]
pub fn nitro_monitor_type(monitor_type: MonitorType) -> (&'static str, &'static str) {
    match monitor_type {
        MonitorType::Http => ("HTTP", "NO"),
        MonitorType::Https => ("HTTP", "YES"),
        MonitorType::Tcp => ("TCP", "NO"),
        MonitorType::Udp => ("UDP", "NO"),
        MonitorType::Icmp => ("PING", "NO"),
    }
}

/// Inverse of [`nitro_monitor_type`]. Unknown Nitro types yield `None`.
#[must_use]
pub fn parse_nitro_monitor_type(nitro_type: &str, secure: bool) -> Option<MonitorType> {
    match nitro_type.to_ascii_uppercase().as_str() {
        "HTTP" | "HTTP-ECV" if secure => Some(MonitorType::Https),
        "HTTP" | "HTTP-ECV" => Some(MonitorType::Http),
        "TCP" | "TCP-ECV" => Some(MonitorType::Tcp),
        "UDP" | "UDP-ECV" => Some(MonitorType::Udp),
        "PING" => Some(MonitorType::Icmp),
        _ => None,
    }
}

fn str_field<'a>(object: &'a Value, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Nitro reports numbers either as JSON numbers or as strings.
fn u16_field(object: &Value, key: &str) -> Option<u16> {
    match object.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Pool member of a service group member binding. The node name is the bound
/// server's name; the host is its IP, or the server name when Nitro omits the IP.
fn member_of_binding(binding: &Value) -> Option<PoolMember> {
    let server = str_field(binding, "servername");
    let host = match str_field(binding, "ip") {
        "" => server,
        ip => ip,
    };
    let port = u16_field(binding, "port")?;
    Some(PoolMember::new(Node::new(server, host), port))
}

/// Objects of `resource` in a Nitro response envelope.
fn records(body: Option<Value>, resource: &str) -> Vec<Value> {
    match body.and_then(|mut b| b.get_mut(resource).map(Value::take)) {
        Some(Value::Array(items)) => items,
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

/// Provider for Citrix ADC (NetScaler) appliances.
#[derive(Debug)]
pub struct CitrixProvider {
    client: RestClient,
    lb_method: String,
    connected: bool,
}

impl CitrixProvider {
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
            CITRIX_DEFAULT_PORT,
            CITRIX_API_PREFIX,
        )?;
        let auth = Auth::Headers(vec![
            (HEADER_USER.to_string(), credentials.username.clone()),
            (HEADER_PASS.to_string(), credentials.password.clone()),
        ]);
        Ok(Self {
            client: RestClient::new(base, auth, config.validate_certs, config.debug)?,
            lb_method: config
                .load_balancing_method
                .clone()
                .unwrap_or_else(|| CITRIX_DEFAULT_LB_METHOD.to_string()),
            connected: false,
        })
    }

    #[must_use]
    pub fn constructor() -> ProviderConstructor {
        Arc::new(|config: &ProviderConfig, credentials: &Credentials| {
            Ok(Box::new(CitrixProvider::new(config, credentials)?) as Box<dyn Provider>)
        })
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }

    async fn fetch(&self, resource: &str, name: &str) -> ProviderResult<Vec<Value>> {
        let url = self.client.url(&format!("{resource}/{name}"), &[])?;
        Ok(records(self.client.get_json::<Value>(url).await?, resource))
    }

    /// `POST`/`PUT` one object wrapped in its envelope, then save.
    async fn write(&self, method: Method, resource: &str, object: Value) -> ProviderResult<()> {
        let url = self.client.url(resource, &[])?;
        self.client
            .send(method, url, Some(&json!({ resource: object })))
            .await?;
        self.save().await
    }

    /// `DELETE` an object; an already absent object counts as deleted.
    async fn remove(&self, resource: &str, name: &str, args: Option<&str>) -> ProviderResult<()> {
        let query: Vec<(&str, &str)> = args.map(|a| ("args", a)).into_iter().collect();
        let url = self.client.url(&format!("{resource}/{name}"), &query)?;
        match self.client.send::<()>(Method::DELETE, url, None).await {
            Err(e) if e.is_not_found() => {
                debug!(resource = %resource, name = %name, "Object already absent");
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => self.save().await,
        }
    }

    async fn save(&self) -> ProviderResult<()> {
        let url = self.client.url("nsconfig", &[("action", "save")])?;
        self.client
            .send(Method::POST, url, Some(&json!({ "nsconfig": {} })))
            .await
    }

    fn monitor_object(monitor: &Monitor) -> Value {
        let (nitro_type, secure) = nitro_monitor_type(monitor.monitor_type);
        let mut object = json!({
            "monitorname": monitor.name,
            "type": nitro_type,
        });
        if monitor.port != 0 {
            object["destport"] = json!(monitor.port);
        }
        if monitor.monitor_type.is_http() {
            object["httprequest"] = json!(format!("GET {}", monitor.path));
            object["secure"] = json!(secure);
        }
        object
    }

    async fn bound_monitor(&self, pool_name: &str) -> ProviderResult<String> {
        Ok(self
            .fetch(MONITOR_BINDING, pool_name)
            .await?
            .first()
            .map(|b| str_field(b, "monitor_name").to_string())
            .unwrap_or_default())
    }

    async fn bind_monitor(&self, pool: &Pool) -> ProviderResult<()> {
        if pool.monitor_name.is_empty() {
            return Ok(());
        }
        self.write(
            Method::POST,
            MONITOR_BINDING,
            json!({
                "servicegroupname": pool.name,
                "monitor_name": pool.monitor_name,
            }),
        )
        .await
    }

    async fn bind_pool(&self, vip: &Vip) -> ProviderResult<()> {
        self.write(
            Method::POST,
            VSERVER_BINDING,
            json!({
                "name": vip.name,
                "servicegroupname": vip.pool_name,
            }),
        )
        .await
    }

    /// Create the `server` object for a member host; an existing one is reused.
    async fn ensure_server(&self, node: &Node) -> ProviderResult<()> {
        let result = self
            .write(
                Method::POST,
                SERVER,
                json!({
                    "name": node.host,
                    "ipaddress": node.host,
                }),
            )
            .await;
        match result {
            Err(e) if e.status() == Some(409) => {
                debug!(server = %node.host, "Server already exists");
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Provider for CitrixProvider {
    async fn connect(&mut self) -> ProviderResult<()> {
        let url = self.client.url("nsversion", &[])?;
        self.client.send::<()>(Method::GET, url, None).await?;
        self.connected = true;
        info!(base_url = %self.client.base_url(), "Connected to Citrix ADC");
        Ok(())
    }

    async fn close(&mut self) -> ProviderResult<()> {
        self.connected = false;
        Ok(())
    }

    async fn get_monitor(&mut self, name: &str) -> ProviderResult<Option<Monitor>> {
        self.ensure_connected()?;
        let Some(record) = self.fetch(MONITOR, name).await?.into_iter().next() else {
            return Ok(None);
        };
        let nitro_type = str_field(&record, "type");
        let secure = str_field(&record, "secure").eq_ignore_ascii_case("YES");
        let monitor_type = parse_nitro_monitor_type(nitro_type, secure).ok_or_else(|| {
            ProviderError::MalformedResponse {
                url: format!("{MONITOR}/{name}"),
                reason: format!("unsupported monitor type '{nitro_type}'"),
            }
        })?;
        let path = str_field(&record, "httprequest")
            .strip_prefix("GET ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();

        Ok(Some(Monitor {
            name: name.to_string(),
            path,
            port: u16_field(&record, "destport").unwrap_or(0),
            monitor_type,
        }))
    }

    async fn create_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        self.write(Method::POST, MONITOR, Self::monitor_object(monitor))
            .await?;
        Ok(monitor.clone())
    }

    async fn edit_monitor(&mut self, monitor: &Monitor) -> ProviderResult<Monitor> {
        self.ensure_connected()?;
        let (wanted_type, _) = nitro_monitor_type(monitor.monitor_type);
        match self.get_monitor(&monitor.name).await? {
            Some(live) if nitro_monitor_type(live.monitor_type).0 != wanted_type => {
                // Nitro cannot change the type of an existing monitor.
                self.delete_monitor(&live).await?;
                self.create_monitor(monitor).await
            }
            Some(_) => {
                self.write(Method::PUT, MONITOR, Self::monitor_object(monitor))
                    .await?;
                Ok(monitor.clone())
            }
            None => self.create_monitor(monitor).await,
        }
    }

    async fn delete_monitor(&mut self, monitor: &Monitor) -> ProviderResult<()> {
        self.ensure_connected()?;
        let (nitro_type, _) = nitro_monitor_type(monitor.monitor_type);
        self.remove(MONITOR, &monitor.name, Some(&format!("type:{nitro_type}")))
            .await
    }

    async fn get_pool(&mut self, name: &str) -> ProviderResult<Option<Pool>> {
        self.ensure_connected()?;
        if self.fetch(SERVICE_GROUP, name).await?.is_empty() {
            return Ok(None);
        }
        Ok(Some(Pool {
            name: name.to_string(),
            monitor_name: self.bound_monitor(name).await?,
            members: Vec::new(),
        }))
    }

    async fn create_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        self.write(
            Method::POST,
            SERVICE_GROUP,
            json!({
                "servicegroupname": pool.name,
                "servicetype": "TCP",
            }),
        )
        .await?;
        self.bind_monitor(pool).await?;
        Ok(Pool {
            members: Vec::new(),
            ..pool.clone()
        })
    }

    async fn edit_pool(&mut self, pool: &Pool) -> ProviderResult<Pool> {
        self.ensure_connected()?;
        let bound = self.bound_monitor(&pool.name).await?;
        if bound != pool.monitor_name {
            if !bound.is_empty() {
                self.remove(MONITOR_BINDING, &pool.name, Some(&format!("monitor_name:{bound}")))
                    .await?;
            }
            self.bind_monitor(pool).await?;
        }
        Ok(pool.clone())
    }

    async fn delete_pool(&mut self, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        self.remove(SERVICE_GROUP, &pool.name, None).await
    }

    async fn get_pool_members(&mut self, pool: &Pool) -> ProviderResult<Vec<PoolMember>> {
        self.ensure_connected()?;
        Ok(self
            .fetch(MEMBER_BINDING, &pool.name)
            .await?
            .iter()
            .filter_map(member_of_binding)
            .collect())
    }

    async fn create_pool_member(
        &mut self,
        member: &PoolMember,
        pool: &Pool,
    ) -> ProviderResult<PoolMember> {
        self.ensure_connected()?;
        self.ensure_server(&member.node).await?;
        self.write(
            Method::POST,
            MEMBER_BINDING,
            json!({
                "servicegroupname": pool.name,
                "servername": member.node.host,
                "port": member.port,
            }),
        )
        .await?;
        Ok(member.clone())
    }

    async fn delete_pool_member(&mut self, member: &PoolMember, pool: &Pool) -> ProviderResult<()> {
        self.ensure_connected()?;
        // Bindings reference servers by name, and a server may be named after anything.
        let live = self
            .fetch(MEMBER_BINDING, &pool.name)
            .await?
            .iter()
            .filter_map(member_of_binding)
            .find(|live| live == member);
        let Some(live) = live else {
            debug!(pool = %pool.name, member = %member, "Member binding already absent");
            return Ok(());
        };
        let args = format!("servername:{},port:{}", live.node.name, live.port);
        self.remove(MEMBER_BINDING, &pool.name, Some(&args)).await
    }

    async fn get_vip(&mut self, name: &str) -> ProviderResult<Option<Vip>> {
        self.ensure_connected()?;
        let Some(record) = self.fetch(VSERVER, name).await?.into_iter().next() else {
            return Ok(None);
        };
        let pool_name = self
            .fetch(VSERVER_BINDING, name)
            .await?
            .first()
            .map(|b| str_field(b, "servicegroupname").to_string())
            .unwrap_or_default();

        Ok(Some(Vip {
            name: name.to_string(),
            ip: str_field(&record, "ipv46").to_string(),
            port: u16_field(&record, "port").unwrap_or(0),
            pool_name,
        }))
    }

    async fn create_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        self.write(
            Method::POST,
            VSERVER,
            json!({
                "name": vip.name,
                "servicetype": "TCP",
                "ipv46": vip.ip,
                "port": vip.port,
                "lbmethod": self.lb_method,
            }),
        )
        .await?;
        self.bind_pool(vip).await?;
        Ok(vip.clone())
    }

    async fn edit_vip(&mut self, vip: &Vip) -> ProviderResult<Vip> {
        self.ensure_connected()?;
        self.write(
            Method::PUT,
            VSERVER,
            json!({
                "name": vip.name,
                "ipv46": vip.ip,
                "port": vip.port,
            }),
        )
        .await?;

        let bound: Vec<String> = self
            .fetch(VSERVER_BINDING, &vip.name)
            .await?
            .iter()
            .map(|b| str_field(b, "servicegroupname").to_string())
            .collect();
        if !bound.iter().any(|group| *group == vip.pool_name) {
            for group in &bound {
                self.remove(VSERVER_BINDING, &vip.name, Some(&format!("servicegroupname:{group}")))
                    .await?;
            }
            self.bind_pool(vip).await?;
        }
        Ok(vip.clone())
    }

    async fn delete_vip(&mut self, vip: &Vip) -> ProviderResult<()> {
        self.ensure_connected()?;
        self.remove(VSERVER, &vip.name, None).await
    }
}

#[cfg(test)]
#[path = "citrix_tests.rs"]
mod citrix_tests;
