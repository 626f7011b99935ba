// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Vendor provider implementations.
//!
//! # Available Providers
//!
//! | Name | Provider | Commit model |
//! |------|----------|--------------|
//! | `dummy` | [`dummy::DummyProvider`] | In memory, immediate |
//! | `f5` | [`f5::F5Provider`] | Immediate, saved on close |
//! | `citrix` | [`citrix::CitrixProvider`] | Immediate, saved after each change |
//! | `haproxy` | [`haproxy::HAProxyProvider`] | One transaction per session |
//!
//! # Example
//!
//! ```rust
//! use lbsync::providers::default_registry;
//!
//! let registry = default_registry();
//! assert_eq!(registry.list(), vec!["citrix", "dummy", "f5", "haproxy"]);
//! ```

pub mod citrix;
pub mod dummy;
pub mod f5;
pub mod haproxy;

use crate::constants::{PROVIDER_CITRIX, PROVIDER_DUMMY, PROVIDER_F5, PROVIDER_HAPROXY};
use crate::registry::ProviderRegistry;
use tracing::warn;

/// Registry with every built-in provider.
#[must_use]
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let builtin = [
        (PROVIDER_DUMMY, dummy::DummyProvider::constructor()),
        (PROVIDER_F5, f5::F5Provider::constructor()),
        (PROVIDER_CITRIX, citrix::CitrixProvider::constructor()),
        (PROVIDER_HAPROXY, haproxy::HAProxyProvider::constructor()),
    ];
    for (name, constructor) in builtin {
        if let Err(e) = registry.register(name, constructor) {
            warn!(provider = %name, error = %e, "Skipping provider registration");
        }
    }
    registry
}
