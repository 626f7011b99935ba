// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for `ExternalLoadBalancer` resources.
//!
//! lbsync follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - `ExternalLoadBalancer` resources and the cluster's nodes
//! 2. **Reconcile** - Build the desired monitor, pools and VIPs and apply them
//!    through a backend session
//! 3. **Status** - Record the applied state and a `Ready` condition
//!
//! # Available Reconcilers
//!
//! - [`reconcile_external_load_balancer`] - Applies a resource to its appliance
//! - [`delete_external_load_balancer`] - Removes everything a resource applied
//!
//! # Example
//!
//! ```rust,no_run
//! use lbsync::crd::ExternalLoadBalancer;
//! use lbsync::providers::default_registry;
//! use lbsync::reconcilers::{reconcile_external_load_balancer, Context};
//! use kube::Client;
//! use std::sync::Arc;
//!
//! async fn reconcile(client: Client, lb: ExternalLoadBalancer) -> anyhow::Result<()> {
//!     let ctx = Context {
//!         client,
//!         registry: Arc::new(default_registry()),
//!     };
//!     reconcile_external_load_balancer(&ctx, &lb).await
//! }
//! ```

pub mod externallb;
pub mod finalizers;
pub mod status;

#[cfg(test)]
mod externallb_tests;
#[cfg(test)]
mod status_tests;

pub use externallb::{delete_external_load_balancer, reconcile_external_load_balancer, Context};
