// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the load balancer backend.
//!
//! This module provides specialized error types for:
//! - Provider registration and lookup
//! - Vendor adapter failures (connection, HTTP status, malformed responses)
//! - Staged-change transactions that were rolled back
//! - Backend session operations, wrapped with the operation and resource name
//! - Unusable appliance credentials Secrets
//!
//! Only the backend session decides how an error propagates; adapters never retry.

use std::fmt;
use thiserror::Error;

/// Errors raised by the [`crate::registry::ProviderRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A constructor is already registered under this name (case-insensitive).
    #[error("provider '{name}' is already registered")]
    ProviderAlreadyRegistered { name: String },

    /// No constructor is registered under this name.
    #[error("no such provider '{name}', available providers: [{}]", available.join(", "))]
    NoSuchProvider {
        /// The name that was looked up
        name: String,
        /// Every registered name, sorted
        available: Vec<String>,
    },
}

/// Errors raised by a vendor adapter.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The adapter could not be built from its configuration.
    #[error("invalid provider configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The HTTP request never produced a response (DNS, TCP, TLS, timeout).
    #[error("{method} {url} failed: {reason}")]
    Connection {
        method: String,
        url: String,
        reason: String,
    },

    /// The appliance answered with a non-success status.
    #[error("{method} {url} returned HTTP {status}: {message}")]
    Http {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    /// The appliance answered with a body the adapter could not interpret.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// A staged-change transaction could not be committed and was discarded.
    #[error("transaction {id} was not committed ({reason}); staged changes rolled back: {rolled_back}")]
    Transaction {
        id: String,
        reason: String,
        rolled_back: bool,
    },

    /// An operation was attempted outside of an open session.
    #[error("provider is not connected")]
    NotConnected,
}

impl ProviderError {
    /// HTTP status of the failure, if the appliance answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for HTTP 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// The adapter call being applied when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetMonitor,
    CreateMonitor,
    EditMonitor,
    DeleteMonitor,
    GetPool,
    CreatePool,
    EditPool,
    DeletePool,
    GetPoolMembers,
    CreatePoolMember,
    DeletePoolMember,
    GetVip,
    CreateVip,
    EditVip,
    DeleteVip,
}

impl Operation {
    /// Stable snake_case label, used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::GetMonitor => "get_monitor",
            Operation::CreateMonitor => "create_monitor",
            Operation::EditMonitor => "edit_monitor",
            Operation::DeleteMonitor => "delete_monitor",
            Operation::GetPool => "get_pool",
            Operation::CreatePool => "create_pool",
            Operation::EditPool => "edit_pool",
            Operation::DeletePool => "delete_pool",
            Operation::GetPoolMembers => "get_pool_members",
            Operation::CreatePoolMember => "create_pool_member",
            Operation::DeletePoolMember => "delete_pool_member",
            Operation::GetVip => "get_vip",
            Operation::CreateVip => "create_vip",
            Operation::EditVip => "edit_vip",
            Operation::DeleteVip => "delete_vip",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::backend::BackendSession`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// The vendor name is not registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The adapter could not be constructed or could not connect.
    #[error("failed to connect to {vendor} provider: {source}")]
    Connect {
        vendor: String,
        #[source]
        source: ProviderError,
    },

    /// An adapter call failed while applying a resource.
    #[error("{operation} '{resource}' failed: {source}")]
    Operation {
        operation: Operation,
        resource: String,
        #[source]
        source: ProviderError,
    },

    /// Closing the session failed. For transactional providers the staged changes
    /// were discarded and nothing was applied.
    #[error("failed to commit changes to {vendor} provider: {source}")]
    Commit {
        vendor: String,
        #[source]
        source: ProviderError,
    },
}

impl BackendError {
    pub(crate) fn operation(
        operation: Operation,
        resource: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        BackendError::Operation {
            operation,
            resource: resource.into(),
            source,
        }
    }

    /// `true` when this error means a staged transaction was rolled back.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            BackendError::Commit {
                source: ProviderError::Transaction {
                    rolled_back: true,
                    ..
                },
                ..
            }
        )
    }
}

/// The appliance credentials Secret could not be used.
#[derive(Error, Debug)]
pub enum CredentialsError {
    /// The Secret could not be fetched.
    #[error("failed to read secret {namespace}/{name}: {source}")]
    Unreadable {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// A required key is missing from both `data` and `stringData`.
    #[error("secret {namespace}/{name} has no '{key}' key")]
    MissingKey {
        namespace: String,
        name: String,
        key: &'static str,
    },

    /// A value under `data` is not valid UTF-8.
    #[error("secret {namespace}/{name} key '{key}' is not valid UTF-8")]
    InvalidValue {
        namespace: String,
        name: String,
        key: &'static str,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
