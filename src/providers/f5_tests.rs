// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the F5 BIG-IP provider.

#[cfg(test)]
mod tests {
    use crate::model::{Credentials, Monitor, MonitorType, Node, Pool, PoolMember, ProviderConfig, Vip};
    use crate::provider::Provider;
    use crate::providers::f5::{
        format_destination, monitor_collection, parse_destination, strip_partition, F5Provider,
    };
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // =====================================================
    // Helper Tests
    // =====================================================

    #[test]
    fn test_monitor_collection_names() {
        assert_eq!(monitor_collection(MonitorType::Http), "http");
        assert_eq!(monitor_collection(MonitorType::Tcp), "tcp");
        assert_eq!(monitor_collection(MonitorType::Icmp), "gateway-icmp");
    }

    #[test]
    fn test_strip_partition() {
        assert_eq!(strip_partition("/Common/Pool-a"), "Pool-a");
        assert_eq!(strip_partition("/Common/Monitor-a "), "Monitor-a");
        assert_eq!(strip_partition("Pool-a"), "Pool-a");
        assert_eq!(strip_partition(""), "");
    }

    #[test]
    fn test_destination_formatting() {
        assert_eq!(format_destination("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(format_destination("2001:db8::1", 443), "2001:db8::1.443");
    }

    #[test]
    fn test_destination_parsing() {
        assert_eq!(
            parse_destination("/Common/10.0.0.1:80"),
            Some(("10.0.0.1".to_string(), 80))
        );
        assert_eq!(
            parse_destination("/Tenant/2001:db8::1.443"),
            Some(("2001:db8::1".to_string(), 443))
        );
        assert_eq!(parse_destination("/Common/nowhere"), None);
    }

    // =====================================================
    // Wire Tests
    // =====================================================

    async fn connected(server: &MockServer) -> F5Provider {
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/sys/version"))
            .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "tm:sys:version:versionstats"})))
            .mount(server)
            .await;

        let config = ProviderConfig {
            vendor: "f5".to_string(),
            host: server.uri(),
            partition: Some("Common".to_string()),
            validate_certs: true,
            ..ProviderConfig::default()
        };
        let mut provider = F5Provider::new(&config, &Credentials::new("admin", "secret")).unwrap();
        provider.connect().await.unwrap();
        provider
    }

    fn monitor() -> Monitor {
        Monitor {
            name: "Monitor-default-web".to_string(),
            path: "/healthz".to_string(),
            port: 30080,
            monitor_type: MonitorType::Http,
        }
    }

    fn pool() -> Pool {
        Pool {
            name: "Pool-default-web-80".to_string(),
            monitor_name: "Monitor-default-web".to_string(),
            members: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_calls_require_connect() {
        let config = ProviderConfig {
            host: "lb.example.com".to_string(),
            ..ProviderConfig::default()
        };
        let mut provider = F5Provider::new(&config, &Credentials::new("a", "b")).unwrap();

        let err = provider.get_pool("Pool-x").await.unwrap_err();

        assert!(matches!(err, crate::errors::ProviderError::NotConnected));
    }

    #[tokio::test]
    async fn test_create_monitor_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/monitor/http"))
            .and(body_json(json!({
                "name": "Monitor-default-web",
                "partition": "Common",
                "defaultsFrom": "/Common/http",
                "interval": 5,
                "timeout": 16,
                "send": "GET /healthz",
                "destination": "*.30080"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let created = provider.create_monitor(&monitor()).await.unwrap();

        assert_eq!(created, monitor());
    }

    #[tokio::test]
    async fn test_get_monitor_probes_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/monitor/tcp/~Common~Monitor-default-web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Monitor-default-web",
                "destination": "*:30080"
            })))
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let live = provider.get_monitor("Monitor-default-web").await.unwrap().unwrap();

        assert_eq!(live.monitor_type, MonitorType::Tcp);
        assert_eq!(live.port, 30080);
        assert_eq!(live.path, "");
    }

    #[tokio::test]
    async fn test_get_monitor_absent() {
        let server = MockServer::start().await;
        let mut provider = connected(&server).await;

        assert!(provider.get_monitor("Monitor-none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_monitor_type_change_recreates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/monitor/tcp/~Common~Monitor-default-web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Monitor-default-web",
                "destination": "*:30080"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mgmt/tm/ltm/monitor/tcp/~Common~Monitor-default-web"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/monitor/http"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        provider.edit_monitor(&monitor()).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_pool_binds_monitor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/pool"))
            .and(body_json(json!({
                "name": "Pool-default-web-80",
                "partition": "Common",
                "loadBalancingMode": "round-robin"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80"))
            .and(body_json(json!({"monitor": "/Common/Monitor-default-web"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let created = provider.create_pool(&pool()).await.unwrap();

        assert!(created.members.is_empty());
        assert_eq!(created.monitor_name, "Monitor-default-web");
    }

    #[tokio::test]
    async fn test_get_pool_strips_monitor_partition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Pool-default-web-80",
                "monitor": "/Common/Monitor-default-web "
            })))
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let live = provider.get_pool("Pool-default-web-80").await.unwrap().unwrap();

        assert_eq!(live.monitor_name, "Monitor-default-web");
    }

    #[tokio::test]
    async fn test_pool_members_round_trip_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "name": "10.0.0.1:30080", "address": "10.0.0.1%0" },
                    { "name": "10.0.0.2:30080" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80/members"))
            .and(body_partial_json(json!({"name": "10.0.0.3:30080", "address": "10.0.0.3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(
                "/mgmt/tm/ltm/pool/~Common~Pool-default-web-80/members/~Common~10.0.0.1:30080",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let members = provider.get_pool_members(&pool()).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].node.host, "10.0.0.1");
        assert_eq!(members[1].port, 30080);

        let added = PoolMember::new(Node::new("node-3", "10.0.0.3"), 30080);
        provider.create_pool_member(&added, &pool()).await.unwrap();
        provider.delete_pool_member(&members[0], &pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_pool_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let gone = Pool {
            name: "Pool-gone".to_string(),
            ..Pool::default()
        };
        provider.delete_pool(&gone).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_vip_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/virtual"))
            .and(body_json(json!({
                "name": "VIP-default-web-80",
                "partition": "Common",
                "destination": "192.0.2.10:80",
                "ipProtocol": "tcp",
                "pool": "/Common/Pool-default-web-80",
                "sourceAddressTranslation": { "type": "automap" },
                "profiles": [ { "name": "fastL4" } ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let vip = Vip {
            name: "VIP-default-web-80".to_string(),
            ip: "192.0.2.10".to_string(),
            port: 80,
            pool_name: "Pool-default-web-80".to_string(),
        };
        provider.create_vip(&vip).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_vip_parses_destination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/virtual/~Common~VIP-default-web-80"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "VIP-default-web-80",
                "destination": "/Common/192.0.2.10:80",
                "pool": "/Common/Pool-default-web-80"
            })))
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let vip = provider.get_vip("VIP-default-web-80").await.unwrap().unwrap();

        assert_eq!(vip.ip, "192.0.2.10");
        assert_eq!(vip.port, 80);
        assert_eq!(vip.pool_name, "Pool-default-web-80");
    }

    #[tokio::test]
    async fn test_close_saves_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/sys/config"))
            .and(body_json(json!({"command": "save"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        provider.close().await.unwrap();
        // A second close is a no-op.
        provider.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_member_uses_live_member_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [ { "name": "web1:30080", "address": "10.0.0.9%0" } ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mgmt/tm/ltm/pool/~Common~Pool-default-web-80/members/~Common~web1:30080"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let mut provider = connected(&server).await;

        let recorded = PoolMember::new(Node::new("worker-9", "10.0.0.9"), 30080);
        provider.delete_pool_member(&recorded, &pool()).await.unwrap();
    }
}
