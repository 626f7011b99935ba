// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Staged-change transactions for the HAProxy Data Plane API.
//!
//! A [`Transaction`] is opened against the configuration version read at the time
//! of opening. Every mutation tagged with its id is staged instead of applied. The
//! transaction then ends in exactly one of two ways:
//!
//! - [`Transaction::commit`] applies every staged change at once with a forced
//!   reload. The appliance rejects the commit if its configuration version moved
//!   since the transaction was opened.
//! - [`Transaction::rollback`] discards every staged change.
//!
//! Both consume the transaction. [`Transaction::finish`] picks between them based on
//! whether any staged call failed. A transaction dropped while still open (for
//! example because the reconcile future was cancelled) schedules a rollback on the
//! current Tokio runtime, so no staged context is left dangling on the appliance.
//!
//! The optimistic version check only protects against writers that also use
//! versioned transactions. Two sessions targeting the same appliance can still race.

use crate::errors::ProviderError;
use crate::http::RestClient;
use crate::provider::ProviderResult;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Query parameter carrying the transaction id on staged calls.
pub const TRANSACTION_ID_PARAM: &str = "transaction_id";

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    id: String,
    #[serde(rename = "_version", default)]
    version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// One open staged-change context.
#[derive(Debug)]
pub struct Transaction {
    client: RestClient,
    id: String,
    version: u64,
    failed: bool,
    state: TransactionState,
}

impl Transaction {
    /// Read the current configuration version and open a transaction against it.
    ///
    /// # Errors
    ///
    /// Returns any request error, or [`ProviderError::MalformedResponse`] if the
    /// version or transaction body cannot be parsed.
    pub async fn begin(client: &RestClient) -> ProviderResult<Self> {
        let version_url = client.url("configuration/version", &[])?;
        let version_text = client
            .request::<()>(Method::GET, version_url.clone(), None)
            .await?;
        let version: u64 =
            version_text
                .trim()
                .parse()
                .map_err(|e| ProviderError::MalformedResponse {
                    url: version_url.to_string(),
                    reason: format!("configuration version '{}': {e}", version_text.trim()),
                })?;

        let version_param = version.to_string();
        let url = client.url("transactions", &[("version", version_param.as_str())])?;
        let opened: TransactionResponse = client
            .send_json::<(), _>(Method::POST, url, None)
            .await?;

        info!(
            transaction = %opened.id,
            version = opened.version.max(version),
            "Opened configuration transaction"
        );

        Ok(Self {
            client: client.clone(),
            id: opened.id,
            version,
            failed: false,
            state: TransactionState::Open,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration version this transaction was opened against.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record that a staged call failed; [`Transaction::finish`] will roll back.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Commit when every staged call succeeded, otherwise roll back.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transaction`] whenever the changes were not
    /// committed, including after a successful rollback of a failed session.
    pub async fn finish(self) -> ProviderResult<()> {
        if self.failed {
            let id = self.id.clone();
            warn!(transaction = %id, "A staged change failed, rolling back transaction");
            let rolled_back = self.rollback().await.is_ok();
            return Err(ProviderError::Transaction {
                id,
                reason: "a staged change failed".to_string(),
                rolled_back,
            });
        }
        self.commit().await
    }

    /// Apply every staged change with a forced reload.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transaction`] if the commit is rejected; the
    /// transaction is then deleted.
    pub async fn commit(mut self) -> ProviderResult<()> {
        let url = self
            .client
            .url(&format!("transactions/{}", self.id), &[("force_reload", "true")])?;

        match self.client.send::<()>(Method::PUT, url, None).await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                info!(transaction = %self.id, "Committed configuration transaction");
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.id, error = %e, "Commit rejected, rolling back transaction");
                let rolled_back = self.delete().await.is_ok();
                self.state = TransactionState::RolledBack;
                Err(ProviderError::Transaction {
                    id: self.id.clone(),
                    reason: e.to_string(),
                    rolled_back,
                })
            }
        }
    }

    /// Discard every staged change.
    ///
    /// # Errors
    ///
    /// Returns the request error if the appliance refused to delete the transaction.
    pub async fn rollback(mut self) -> ProviderResult<()> {
        let result = self.delete().await;
        self.state = TransactionState::RolledBack;
        if result.is_ok() {
            info!(transaction = %self.id, "Rolled back configuration transaction");
        }
        result
    }

    async fn delete(&self) -> ProviderResult<()> {
        let url = self.client.url(&format!("transactions/{}", self.id), &[])?;
        self.client.send::<()>(Method::DELETE, url, None).await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }

        warn!(transaction = %self.id, "Transaction dropped while open, scheduling rollback");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(transaction = %self.id, "No async runtime available, transaction left open");
            return;
        };

        let client = self.client.clone();
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            let result = match client.url(&format!("transactions/{id}"), &[]) {
                Ok(url) => client.send::<()>(Method::DELETE, url, None).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!(transaction = %id, "Rolled back abandoned transaction"),
                Err(e) => warn!(transaction = %id, error = %e, "Failed to roll back abandoned transaction"),
            }
        });
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod transaction_tests;
