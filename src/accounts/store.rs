//! Credential Store (§4.2) — in-memory account map plus cached access
//! tokens, with single-flight refresh per account.
//!
//! Single-flight discipline follows the pool lock / refresh ordering rule
//! in §5: the map lock is never held across an `.await` of a refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::Account;
use crate::error::EngineError;
use crate::refresh::TokenRefresher;

struct Entry {
    account: Account,
    /// Guards concurrent refreshes for this one account; whoever holds the
    /// lock performs the refresh, everyone else observes its result once
    /// released (classic single-flight via mutual exclusion).
    refresh_gate: Arc<Mutex<()>>,
}

#[derive(Default)]
pub struct CredentialStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, account: Account) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&account.id) {
            Some(existing) => existing.account = account,
            None => {
                entries.insert(
                    account.id.clone(),
                    Entry {
                        account,
                        refresh_gate: Arc::new(Mutex::new(())),
                    },
                );
            }
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Account> {
        self.entries.write().await.remove(id).map(|e| e.account)
    }

    pub async fn get(&self, id: &str) -> Option<Account> {
        self.entries.read().await.get(id).map(|e| e.account.clone())
    }

    pub async fn snapshot(&self) -> Vec<Account> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.account.clone())
            .collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Apply a mutation to one account under the map lock. Used by the pool
    /// for counter/state updates that must be atomic with selection.
    pub async fn mutate<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Account) -> R,
    {
        let mut entries = self.entries.write().await;
        entries.get_mut(id).map(|e| f(&mut e.account))
    }

    /// Produce a valid access token for `id`, refreshing if the cached
    /// token is stale or absent (§4.2 `ensureValidToken`).
    pub async fn ensure_valid_token(
        &self,
        id: &str,
        refresher: &TokenRefresher,
        safety_margin: Duration,
    ) -> Result<String, EngineError> {
        let gate = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(id)
                .ok_or_else(|| EngineError::Configuration(format!("unknown account {id}")))?;
            if let Some(token) = self.cached_token_if_valid(&entry.account, safety_margin) {
                return Ok(token);
            }
            entry.refresh_gate.clone()
        };

        // Release the map lock before awaiting the refresh (§5 ordering rule).
        let _permit = gate.lock().await;

        // Re-check: another caller may have refreshed while we waited for the gate.
        if let Some(account) = self.get(id).await {
            if let Some(token) = self.cached_token_if_valid(&account, safety_margin) {
                return Ok(token);
            }
            let outcome = refresher.refresh(id, &account.credentials).await?;
            let token = {
                use crate::secret::ExposeSecret;
                outcome.access_token.expose_secret().to_string()
            };
            self.mutate(id, |a| {
                a.credentials.access_token = Some(outcome.access_token.clone());
                a.credentials.expires_at = Some(outcome.expires_at);
            })
            .await;
            Ok(token)
        } else {
            Err(EngineError::Configuration(format!("unknown account {id}")))
        }
    }

    fn cached_token_if_valid(&self, account: &Account, safety_margin: Duration) -> Option<String> {
        use crate::secret::ExposeSecret;
        if account.credentials.has_valid_access_token(safety_margin) {
            account
                .credentials
                .access_token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
        } else {
            None
        }
    }
}
