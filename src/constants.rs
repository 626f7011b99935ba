// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the lbsync operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the lbsync CRDs
pub const API_GROUP: &str = "lbsync.firestoned.io";

/// API version for the lbsync CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for `ExternalLoadBalancer` resource
pub const KIND_EXTERNAL_LOAD_BALANCER: &str = "ExternalLoadBalancer";

/// Finalizer guarding appliance cleanup
pub const FINALIZER_EXTERNAL_LOAD_BALANCER: &str = "lbsync.firestoned.io/finalizer";

/// Secret key holding the appliance username
pub const SECRET_KEY_USERNAME: &str = "username";

/// Secret key holding the appliance password
pub const SECRET_KEY_PASSWORD: &str = "password";

// ============================================================================
// Resource Naming
// ============================================================================

/// Prefix of monitor names (`Monitor-{namespace}-{name}`)
pub const MONITOR_NAME_PREFIX: &str = "Monitor";

/// Prefix of pool names (`Pool-{namespace}-{name}-{port}`)
pub const POOL_NAME_PREFIX: &str = "Pool";

/// Prefix of VIP names (`VIP-{namespace}-{name}-{port}`)
pub const VIP_NAME_PREFIX: &str = "VIP";

/// Default monitor path when the resource does not set one
pub const DEFAULT_MONITOR_PATH: &str = "/";

// ============================================================================
// Provider Names
// ============================================================================

/// In-memory reference provider
pub const PROVIDER_DUMMY: &str = "dummy";

/// F5 BIG-IP iControl REST provider
pub const PROVIDER_F5: &str = "f5";

/// Citrix ADC Nitro provider
pub const PROVIDER_CITRIX: &str = "citrix";

/// HAProxy Data Plane API provider
pub const PROVIDER_HAPROXY: &str = "haproxy";

// ============================================================================
// HTTP Constants
// ============================================================================

/// Timeout of a single appliance API request
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// F5 Constants
// ============================================================================

/// Default F5 management port
pub const F5_DEFAULT_PORT: u16 = 443;

/// Default F5 administrative partition
pub const F5_DEFAULT_PARTITION: &str = "Common";

/// iControl REST traffic management root
pub const F5_API_PREFIX: &str = "/mgmt/tm";

/// Monitor polling interval (seconds)
pub const F5_MONITOR_INTERVAL_SECS: u32 = 5;

/// Monitor timeout (seconds)
pub const F5_MONITOR_TIMEOUT_SECS: u32 = 16;

/// Profile attached to every virtual server
pub const F5_VIRTUAL_PROFILE: &str = "fastL4";

/// Default pool load balancing mode
pub const F5_DEFAULT_LB_METHOD: &str = "round-robin";

// ============================================================================
// Citrix Constants
// ============================================================================

/// Default Nitro management port
pub const CITRIX_DEFAULT_PORT: u16 = 443;

/// Nitro configuration root
pub const CITRIX_API_PREFIX: &str = "/nitro/v1/config";

/// Default lbvserver method
pub const CITRIX_DEFAULT_LB_METHOD: &str = "ROUNDROBIN";

// ============================================================================
// HAProxy Constants
// ============================================================================

/// Default Data Plane API port
pub const HAPROXY_DEFAULT_PORT: u16 = 5555;

/// Data Plane API root
pub const HAPROXY_API_PREFIX: &str = "/v2/services/haproxy";

/// Default backend balance algorithm
pub const HAPROXY_DEFAULT_LB_METHOD: &str = "roundrobin";

// ============================================================================
// Controller Constants
// ============================================================================

/// Requeue interval after a successful reconcile (5 minutes)
pub const DEFAULT_REQUEUE_SECS: u64 = 300;

/// Requeue interval after a failed reconcile (30 seconds)
pub const ERROR_REQUEUE_SECS: u64 = 30;

/// Default metrics listen address
pub const DEFAULT_METRICS_ADDRESS: &str = "0.0.0.0:8080";

/// Condition type reported on the resource
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Reason for a successfully applied resource
pub const REASON_RECONCILED: &str = "Reconciled";

/// Reason for a failed reconcile
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

/// Reason when the vendor is not registered
pub const REASON_UNKNOWN_PROVIDER: &str = "UnknownProvider";

/// Reason when a staged transaction was rolled back
pub const REASON_TRANSACTION_ROLLED_BACK: &str = "TransactionRolledBack";

/// Reason when credentials cannot be read
pub const REASON_CREDENTIALS_UNAVAILABLE: &str = "CredentialsUnavailable";
