//! Account pool data model and scheduling (§3, §4.2, §4.3, §4.4).

mod pool;
mod store;
mod sync;

pub use pool::{AccountPool, AccountSnapshot};
pub use store::CredentialStore;
pub use sync::SharedFileSynchronizer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::secret::SecretString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Social,
    Idc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Cooldown,
    Invalid,
    Disabled,
}

/// Credential fields for one account (§3 Credentials).
///
/// `refresh_token` must be present for the account to be selectable.
/// `client_id`/`client_secret` are required only when `auth_method == Idc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub refresh_token: SecretString,
    pub access_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    pub machine_id: Option<String>,
    pub region: Option<String>,
    pub auth_method: AuthMethod,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    /// ARN carried through to the upstream request envelope when present.
    pub profile_arn: Option<String>,
}

impl Credentials {
    /// Whether the cached access token is valid with the given safety
    /// margin (§4.2: `expiresAt − now ≥ 60s` by default).
    pub fn has_valid_access_token(&self, safety_margin: Duration) -> bool {
        let (Some(_), Some(expires_at)) = (&self.access_token, self.expires_at) else {
            return false;
        };
        let margin = chrono::Duration::from_std(safety_margin).unwrap_or_default();
        expires_at - margin > Utc::now()
    }
}

/// One pooled account (§3 Account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub credentials: Credentials,
    pub status: AccountStatus,
    pub request_count: u64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage: Option<serde_json::Value>,
}

impl Account {
    pub fn new(id: String, name: String, credentials: Credentials) -> Self {
        Self {
            id,
            name,
            credentials,
            status: AccountStatus::Active,
            request_count: 0,
            error_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
            usage: None,
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
