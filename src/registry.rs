// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Name-keyed table of provider constructors.
//!
//! The registry is an owned value built once at start-up and passed by reference
//! to wherever sessions are opened. Names are case-insensitive and stored
//! lowercase.
//!
//! # Example
//!
//! ```rust
//! use lbsync::providers::dummy::DummyProvider;
//! use lbsync::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("Dummy", DummyProvider::constructor()).unwrap();
//!
//! assert!(registry.lookup("DUMMY").is_ok());
//! assert_eq!(registry.list(), vec!["dummy".to_string()]);
//! ```

use crate::errors::RegistryError;
use crate::provider::ProviderConstructor;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Table of provider constructors keyed by lowercase vendor name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ProviderAlreadyRegistered`] if `name` (compared
    /// case-insensitively) already has an entry; the existing entry is kept.
    pub fn register(
        &mut self,
        name: &str,
        constructor: ProviderConstructor,
    ) -> Result<(), RegistryError> {
        let key = name.to_lowercase();
        if self.providers.contains_key(&key) {
            return Err(RegistryError::ProviderAlreadyRegistered { name: key });
        }

        debug!(provider = %key, "Registered load balancer provider");
        self.providers.insert(key, constructor);
        Ok(())
    }

    /// Find the constructor registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoSuchProvider`] listing every registered name.
    pub fn lookup(&self, name: &str) -> Result<ProviderConstructor, RegistryError> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchProvider {
                name: name.to_string(),
                available: self.list(),
            })
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
