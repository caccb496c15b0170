//! Admin Control Surface (§4.8, spec.md §6.2) — the service-layer contract
//! the HTTP layer calls into. No HTTP framework dependency: routing, auth
//! middleware, and the bearer-key check are external.
//!
//! Builds on a plain read-only stats accessor, extended with the mutating
//! operations this surface needs.

use std::sync::Arc;

use serde::Serialize;

use crate::accounts::{AccountPool, AccountSnapshot};
use crate::config::SelectionPolicy;
use crate::error::EngineError;

/// `priority`/`balanced` as named in spec.md §6.2, distinct from `compatMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancingMode {
    Priority,
    Balanced,
}

impl From<SelectionPolicy> for LoadBalancingMode {
    fn from(policy: SelectionPolicy) -> Self {
        match policy {
            SelectionPolicy::RoundRobin | SelectionPolicy::Random => Self::Balanced,
            SelectionPolicy::LeastUsed => Self::Priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialsOverview {
    pub accounts: Vec<AccountSnapshot>,
}

pub struct AdminService {
    pool: Arc<AccountPool>,
    load_balancing: std::sync::RwLock<LoadBalancingMode>,
}

impl AdminService {
    pub fn new(pool: Arc<AccountPool>, load_balancing: LoadBalancingMode) -> Self {
        Self {
            pool,
            load_balancing: std::sync::RwLock::new(load_balancing),
        }
    }

    pub async fn list_credentials(&self) -> CredentialsOverview {
        CredentialsOverview {
            accounts: self.pool.list().await,
        }
    }

    /// Manual cooldown recovery for one account (`reset` in the UI).
    pub async fn reset_credential(&self, id: &str) -> Result<(), EngineError> {
        self.pool.recover_cooldown(id).await
    }

    pub async fn set_disabled(&self, id: &str, disabled: bool) -> Result<(), EngineError> {
        if disabled {
            self.pool.disable(id).await
        } else {
            self.pool.enable(id).await
        }
    }

    pub fn get_load_balancing(&self) -> LoadBalancingMode {
        *self.load_balancing.read().expect("load balancing lock poisoned")
    }

    /// Only records the operator's choice for display; the pool's actual
    /// selection policy is fixed at construction (§4.3) and not hot-swapped.
    pub fn set_load_balancing(&self, mode: LoadBalancingMode) -> Result<(), EngineError> {
        *self.load_balancing.write().expect("load balancing lock poisoned") = mode;
        Ok(())
    }
}
