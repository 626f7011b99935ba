// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pool member set difference.
//!
//! Members are compared by `(host, port)` only; see [`PoolMember`].

use crate::model::{MemberKey, PoolMember};
use std::collections::HashSet;

/// Members to add to and remove from a live pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDiff {
    /// Desired members missing from the appliance, in desired order.
    pub to_add: Vec<PoolMember>,
    /// Live members no longer desired, in live order.
    pub to_remove: Vec<PoolMember>,
}

impl MemberDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute which members must be created and which deleted so that `existing`
/// becomes `desired`.
#[must_use]
pub fn diff_pool_members(existing: &[PoolMember], desired: &[PoolMember]) -> MemberDiff {
    let existing_keys: HashSet<MemberKey<'_>> = existing.iter().map(PoolMember::key).collect();
    let desired_keys: HashSet<MemberKey<'_>> = desired.iter().map(PoolMember::key).collect();

    let mut seen = HashSet::new();
    let to_add = desired
        .iter()
        .filter(|m| !existing_keys.contains(&m.key()) && seen.insert(m.key()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let to_remove = existing
        .iter()
        .filter(|m| !desired_keys.contains(&m.key()) && seen.insert(m.key()))
        .cloned()
        .collect();

    MemberDiff { to_add, to_remove }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
