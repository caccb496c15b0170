//! Account Pool (§3, §4.3) — selection policies and the account status
//! state machine, with auto-recovery from cooldown.
//!
//! Selection is a round-robin cursor guarded by its own lock, with
//! `priority`/`cost-optimized` style policies generalized here to
//! `least-used`. State transitions extend a plain success/failure counter
//! shape with the cooldown/disable/invalid states this pool needs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use super::{Account, AccountStatus};
use crate::config::SelectionPolicy;
use crate::error::EngineError;

use super::store::CredentialStore;

/// Read-only view of an account for listings and the admin surface (§4.8).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub name: String,
    pub status: AccountStatus,
    pub request_count: u64,
    pub error_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&Account> for AccountSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            status: account.status,
            request_count: account.request_count,
            error_count: account.error_count,
            last_used_at: account.last_used_at,
        }
    }
}

pub struct AccountPool {
    store: Arc<CredentialStore>,
    order: RwLock<Vec<String>>,
    cursor: RwLock<usize>,
    selection_policy: SelectionPolicy,
    cooldown_duration: Duration,
}

impl AccountPool {
    pub fn new(selection_policy: SelectionPolicy, cooldown_duration: Duration) -> Self {
        Self {
            store: Arc::new(CredentialStore::new()),
            order: RwLock::new(Vec::new()),
            cursor: RwLock::new(0),
            selection_policy,
            cooldown_duration,
        }
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    pub async fn add_account(&self, account: Account) {
        let id = account.id.clone();
        let is_new = !self.store.contains(&id).await;
        self.store.upsert(account).await;
        if is_new {
            self.order.write().await.push(id);
        }
    }

    pub async fn remove_account(&self, id: &str) -> Option<Account> {
        self.order.write().await.retain(|existing| existing != id);
        self.store.remove(id).await
    }

    /// Replace the pool's account set from a freshly parsed shared file
    /// snapshot (§4.4). Records missing from `records` are dropped; records
    /// present in both keep their runtime counters and a `cooldown` status
    /// survives even if the file now reports something else.
    pub async fn apply_shared_snapshot(&self, records: Vec<super::sync::ImportedAccount>) {
        let mut order = Vec::with_capacity(records.len());
        for imported in records {
            order.push(imported.id.clone());
            let merged = match self.store.get(&imported.id).await {
                Some(mut existing) => {
                    existing.name = imported.name;
                    existing.credentials = imported.credentials;
                    existing.status = if existing.status == AccountStatus::Cooldown {
                        AccountStatus::Cooldown
                    } else {
                        imported.status
                    };
                    existing
                }
                None => {
                    let mut account =
                        Account::new(imported.id.clone(), imported.name, imported.credentials);
                    account.status = imported.status;
                    account
                }
            };
            self.store.upsert(merged).await;
        }

        let keep: std::collections::HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let stale: Vec<String> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .map(|a| a.id)
            .filter(|id| !keep.contains(id.as_str()))
            .collect();
        for id in stale {
            self.store.remove(&id).await;
        }

        *self.order.write().await = order;
        *self.cursor.write().await = 0;
    }

    pub async fn list(&self) -> Vec<AccountSnapshot> {
        self.store
            .snapshot()
            .await
            .iter()
            .map(AccountSnapshot::from)
            .collect()
    }

    /// Choose an eligible account under the pool's policy (§4.3).
    ///
    /// Counter/cursor updates happen in the same critical section as the
    /// choice: no other caller can observe a half-applied selection.
    pub async fn select(&self) -> Result<String, EngineError> {
        match self.selection_policy {
            SelectionPolicy::RoundRobin => self.select_round_robin().await,
            SelectionPolicy::Random => self.select_random().await,
            SelectionPolicy::LeastUsed => self.select_least_used().await,
        }
    }

    async fn select_round_robin(&self) -> Result<String, EngineError> {
        let order = self.order.read().await;
        if order.is_empty() {
            return Err(EngineError::NoAvailableAccount);
        }
        let mut cursor = self.cursor.write().await;
        for step in 0..order.len() {
            let idx = (*cursor + step) % order.len();
            let id = &order[idx];
            if let Some(account) = self.store.get(id).await {
                if account.is_selectable() {
                    *cursor = (idx + 1) % order.len();
                    self.bump_usage(id).await;
                    return Ok(id.clone());
                }
            }
        }
        Err(EngineError::NoAvailableAccount)
    }

    async fn select_random(&self) -> Result<String, EngineError> {
        let eligible: Vec<String> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|a| a.is_selectable())
            .map(|a| a.id)
            .collect();
        if eligible.is_empty() {
            return Err(EngineError::NoAvailableAccount);
        }
        let idx = rand::thread_rng().gen_range(0..eligible.len());
        let id = &eligible[idx];
        self.bump_usage(id).await;
        Ok(id.clone())
    }

    /// Smallest `request_count` wins; ties broken by insertion order (§4.3),
    /// so this walks `order` rather than the store's hash-map snapshot.
    async fn select_least_used(&self) -> Result<String, EngineError> {
        let order = self.order.read().await;
        let mut best: Option<(&str, u64)> = None;
        for id in order.iter() {
            if let Some(account) = self.store.get(id).await {
                if account.is_selectable()
                    && best.is_none_or(|(_, count)| account.request_count < count)
                {
                    best = Some((id, account.request_count));
                }
            }
        }
        let id = best.map(|(id, _)| id.to_string()).ok_or(EngineError::NoAvailableAccount)?;
        self.bump_usage(&id).await;
        Ok(id)
    }

    /// `requestCount`/`lastUsedAt` move together, atomically with selection
    /// (§4.3, §8 property 1) — not as a separate post-call step.
    async fn bump_usage(&self, id: &str) {
        self.store
            .mutate(id, |a| {
                a.request_count += 1;
                a.last_used_at = Some(Utc::now());
            })
            .await;
    }

    /// Upstream reported the account as rate-limited: `active` → `cooldown`,
    /// with an auto-recovery timer (§4.3 transition table).
    pub async fn record_rate_limited(&self, id: &str) {
        let transitioned = self
            .store
            .mutate(id, |a| {
                a.error_count += 1;
                if a.status == AccountStatus::Active {
                    a.status = AccountStatus::Cooldown;
                    true
                } else {
                    false
                }
            })
            .await
            .unwrap_or(false);

        if transitioned {
            self.schedule_cooldown_recovery(id.to_string());
        }
    }

    /// The refresh token was revoked or otherwise fatally rejected:
    /// `active`/`cooldown` → `invalid` (terminal).
    pub async fn mark_invalid(&self, id: &str) {
        self.store
            .mutate(id, |a| {
                a.error_count += 1;
                a.status = AccountStatus::Invalid;
            })
            .await;
    }

    /// Manual operator disable: any status → `disabled`.
    pub async fn disable(&self, id: &str) -> Result<(), EngineError> {
        self.store
            .mutate(id, |a| a.status = AccountStatus::Disabled)
            .await
            .ok_or_else(|| EngineError::Configuration(format!("unknown account {id}")))
    }

    /// Manual operator enable: `disabled` → `active`. `invalid` is terminal
    /// and cannot be re-enabled this way.
    pub async fn enable(&self, id: &str) -> Result<(), EngineError> {
        let applied = self
            .store
            .mutate(id, |a| {
                if a.status == AccountStatus::Disabled {
                    a.status = AccountStatus::Active;
                    true
                } else {
                    false
                }
            })
            .await
            .ok_or_else(|| EngineError::Configuration(format!("unknown account {id}")))?;
        if applied {
            Ok(())
        } else {
            Err(EngineError::Configuration(format!(
                "account {id} is not disabled"
            )))
        }
    }

    /// Manual operator recovery: `cooldown` → `active` immediately.
    pub async fn recover_cooldown(&self, id: &str) -> Result<(), EngineError> {
        let applied = self
            .store
            .mutate(id, |a| {
                if a.status == AccountStatus::Cooldown {
                    a.status = AccountStatus::Active;
                    true
                } else {
                    false
                }
            })
            .await
            .ok_or_else(|| EngineError::Configuration(format!("unknown account {id}")))?;
        if applied {
            Ok(())
        } else {
            Err(EngineError::Configuration(format!(
                "account {id} is not in cooldown"
            )))
        }
    }

    pub async fn recover_all_cooldowns(&self) -> usize {
        let ids: Vec<String> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|a| a.status == AccountStatus::Cooldown)
            .map(|a| a.id)
            .collect();
        let mut recovered = 0;
        for id in ids {
            if self.recover_cooldown(&id).await.is_ok() {
                recovered += 1;
            }
        }
        recovered
    }

    fn schedule_cooldown_recovery(&self, id: String) {
        let store = self.store.clone();
        let delay = self.cooldown_duration;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let recovered = store
                .mutate(&id, |a| {
                    if a.status == AccountStatus::Cooldown {
                        a.status = AccountStatus::Active;
                        true
                    } else {
                        false
                    }
                })
                .await
                .unwrap_or(false);
            if recovered {
                info!(account = %id, "account auto-recovered from cooldown");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AuthMethod, Credentials};
    use crate::secret::SecretString;

    fn test_account(id: &str) -> Account {
        Account::new(
            id.to_string(),
            id.to_string(),
            Credentials {
                refresh_token: SecretString::new("rt".to_string()),
                access_token: None,
                expires_at: None,
                machine_id: None,
                region: None,
                auth_method: AuthMethod::Social,
                client_id: None,
                client_secret: None,
                profile_arn: None,
            },
        )
    }

    #[tokio::test]
    async fn round_robin_cycles_through_accounts() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50));
        pool.add_account(test_account("a")).await;
        pool.add_account(test_account("b")).await;

        let first = pool.select().await.unwrap();
        let second = pool.select().await.unwrap();
        let third = pool.select().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn round_robin_skips_ineligible_accounts() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50));
        pool.add_account(test_account("a")).await;
        pool.add_account(test_account("b")).await;
        pool.disable("a").await.unwrap();

        assert_eq!(pool.select().await.unwrap(), "b");
        assert_eq!(pool.select().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn empty_pool_fails_selection() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50));
        assert!(matches!(
            pool.select().await.unwrap_err(),
            EngineError::NoAvailableAccount
        ));
    }

    #[tokio::test]
    async fn rate_limited_account_auto_recovers() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(20));
        pool.add_account(test_account("a")).await;
        pool.record_rate_limited("a").await;

        assert!(pool.select().await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pool.select().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn invalid_account_is_terminal() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50));
        pool.add_account(test_account("a")).await;
        pool.mark_invalid("a").await;
        assert!(pool.enable("a").await.is_err());
        assert!(pool.select().await.is_err());
    }

    #[tokio::test]
    async fn least_used_prefers_lower_request_count() {
        let pool = AccountPool::new(SelectionPolicy::LeastUsed, Duration::from_millis(50));
        pool.add_account(test_account("a")).await;
        pool.add_account(test_account("b")).await;

        // Ties broken by insertion order: "a" first, then "b" (now the
        // least-used), then "a" again once both are tied at 1.
        assert_eq!(pool.select().await.unwrap(), "a");
        assert_eq!(pool.select().await.unwrap(), "b");
        assert_eq!(pool.select().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn selection_bumps_request_count_atomically() {
        let pool = AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50));
        pool.add_account(test_account("a")).await;

        pool.select().await.unwrap();
        pool.select().await.unwrap();

        let snapshot = pool.list().await;
        assert_eq!(snapshot[0].request_count, 2);
        assert!(snapshot[0].last_used_at.is_some());
    }
}
