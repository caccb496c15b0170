//! Shared-File Synchronizer (§4.4, §6.1) — one-way importer from an
//! external JSON file that enumerates accounts, debounced by file mtime.
//!
//! Follows the same read-whole-file-then-parse shape as `config.rs::load`,
//! with parse errors surfaced as a logged `ConfigurationError` rather than
//! a panic. The at-most-one-sync-at-a-time rule is a `tokio::sync::Mutex`
//! held across the whole read+parse+swap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use super::pool::AccountPool;
use super::{AccountStatus, AuthMethod, Credentials};
use crate::error::EngineError;
use crate::secret::SecretString;

pub struct ImportedAccount {
    pub id: String,
    pub name: String,
    pub credentials: Credentials,
    pub status: AccountStatus,
}

pub struct SharedFileSynchronizer {
    path: PathBuf,
    last_seen_mtime: Mutex<Option<SystemTime>>,
    missing_warned: AtomicBool,
}

impl SharedFileSynchronizer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_seen_mtime: Mutex::new(None),
            missing_warned: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file's mtime and, if changed (or `force`), reparse and
    /// swap the pool's account set. Returns whether a reload happened.
    pub async fn sync_if_needed(
        &self,
        pool: &AccountPool,
        force: bool,
    ) -> Result<bool, EngineError> {
        // Holding this lock across the whole read+parse+swap is what makes
        // concurrent callers share one in-flight sync's result: a caller
        // that arrives mid-sync waits here, then observes the mtime the
        // winner just recorded and (usually) has nothing left to do.
        let mut last_seen = self.last_seen_mtime.lock().await;

        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(_) => {
                if !self.missing_warned.swap(true, Ordering::SeqCst) {
                    warn!(path = %self.path.display(), "shared accounts file missing, treating as empty");
                }
                if last_seen.is_some() {
                    pool.apply_shared_snapshot(Vec::new()).await;
                    *last_seen = None;
                }
                return Ok(false);
            }
        };
        self.missing_warned.store(false, Ordering::SeqCst);

        let mtime = metadata.modified().map_err(|e| {
            EngineError::Configuration(format!("cannot read shared file mtime: {e}"))
        })?;

        if !force {
            if let Some(seen) = *last_seen {
                if mtime <= seen {
                    return Ok(false);
                }
            }
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineError::Configuration(format!("cannot read shared file: {e}")))?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| EngineError::Configuration(format!("shared file is not valid JSON: {e}")))?;
        let entries = raw
            .as_array()
            .ok_or_else(|| EngineError::Configuration("shared file is not a JSON array".into()))?;

        let records = entries
            .iter()
            .filter_map(|entry| match parse_record(entry) {
                Ok(record) => Some(record),
                Err(reason) => {
                    warn!(reason = %reason, "dropping unparsable shared account record");
                    None
                }
            })
            .collect();

        pool.apply_shared_snapshot(records).await;
        *last_seen = Some(mtime);
        Ok(true)
    }
}

fn field<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| entry.get(key))
}

fn field_str<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a str> {
    field(entry, keys).and_then(|v| v.as_str())
}

fn parse_record(entry: &Value) -> Result<ImportedAccount, String> {
    let id = field_str(entry, &["id"])
        .or_else(|| field_str(entry, &["email"]))
        .ok_or("missing id/email")?
        .to_string();

    let refresh_token = field_str(entry, &["refreshToken", "refresh_token"])
        .ok_or("missing refresh token")?
        .to_string();

    let access_token =
        field_str(entry, &["accessToken", "access_token"]).map(|s| SecretString::new(s.to_string()));

    let expires_at = field(entry, &["expiresAt", "expires_at"]).and_then(parse_timestamp);

    let machine_id = field_str(entry, &["machineId", "machine_id"]).map(str::to_string);
    let region = field_str(entry, &["region"]).map(str::to_string);
    let client_id = field_str(entry, &["clientId", "client_id"]).map(str::to_string);
    let client_secret =
        field_str(entry, &["clientSecret", "client_secret"]).map(|s| SecretString::new(s.to_string()));

    let provider = field_str(entry, &["provider"]).unwrap_or("").to_lowercase();
    let auth_method = if client_id.is_some() && client_secret.is_some()
        || provider.contains("idc")
        || provider.contains("identity center")
        || provider.contains("builder")
    {
        AuthMethod::Idc
    } else {
        AuthMethod::Social
    };

    let name = field_str(entry, &["label", "email", "name"])
        .unwrap_or(&id)
        .to_string();

    let status = normalize_status(field_str(entry, &["status"]).unwrap_or(""));

    Ok(ImportedAccount {
        id,
        name,
        credentials: Credentials {
            refresh_token: SecretString::new(refresh_token),
            access_token,
            expires_at,
            machine_id,
            region,
            auth_method,
            client_id,
            client_secret,
            profile_arn: None,
        },
        status,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(text) = value.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(millis) = value.as_i64() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    None
}

/// §6.1 status normalization.
fn normalize_status(raw: &str) -> AccountStatus {
    let lower = raw.to_lowercase();
    if lower.contains("invalid") || lower.contains("ban") || raw.contains('封') || raw.contains('失') {
        AccountStatus::Invalid
    } else if lower.contains("disabled") || raw.contains('禁') {
        AccountStatus::Disabled
    } else if lower.contains("cooldown") || raw.contains('冷') {
        AccountStatus::Cooldown
    } else {
        AccountStatus::Active
    }
}
