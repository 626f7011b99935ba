// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # lbsync - External Load Balancer Operator for Kubernetes
//!
//! lbsync keeps external load balancer appliances (F5 BIG-IP, Citrix ADC, HAProxy
//! Data Plane API) in sync with the nodes of a Kubernetes cluster. Each
//! `ExternalLoadBalancer` resource becomes one health monitor, one pool per exposed
//! port whose members are the cluster's eligible nodes, and one VIP per port.
//!
//! ## Modules
//!
//! - [`model`] - Vendor-neutral Monitor, Pool, Vip and snapshot types
//! - [`provider`] - The adapter contract every vendor implements
//! - [`registry`] - Name-keyed table of provider constructors
//! - [`backend`] - Diff-and-apply session on top of one provider
//! - [`transaction`] - Staged changes for transactional providers
//! - [`providers`] - Built-in vendor adapters
//! - [`crd`] - The `ExternalLoadBalancer` custom resource
//! - [`desired`] - Desired state derived from a resource and the cluster's nodes
//! - [`reconcilers`] - Reconcile and delete orchestration
//!
//! ## Example
//!
//! ```rust,no_run
//! use lbsync::backend::BackendSession;
//! use lbsync::model::{Credentials, Monitor, ProviderConfig};
//! use lbsync::providers::default_registry;
//!
//! # async fn example() -> Result<(), lbsync::errors::BackendError> {
//! let registry = default_registry();
//! let config = ProviderConfig {
//!     vendor: "dummy".to_string(),
//!     host: "lb.example.com".to_string(),
//!     ..ProviderConfig::default()
//! };
//!
//! let mut session = BackendSession::open(&registry, &config, &Credentials::default()).await?;
//! session
//!     .handle_monitor(&Monitor {
//!         name: "Monitor-default-web".to_string(),
//!         port: 30080,
//!         ..Monitor::default()
//!     })
//!     .await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod constants;
pub mod crd;
pub mod desired;
pub mod diff;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod providers;
pub mod reconcilers;
pub mod registry;
pub mod transaction;
