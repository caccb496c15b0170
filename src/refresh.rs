//! Token Refresher (§4.2) — exchanges a stored refresh token for a fresh
//! access token, dispatching on the account's auth method.
//!
//! Request building and status mapping follow the same OAuth/session-token
//! exchange shape as a device-flow polling loop; retried with the shared
//! backoff engine in `retry::`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::accounts::{AuthMethod, Credentials};
use crate::error::EngineError;
use crate::retry::{self, RetryDecision, RetryPolicy, RetryReason};
use crate::secret::SecretString;

const SOCIAL_TOKEN_URL: &str = "https://oidc.us-east-1.amazonaws.com/token";
const IDC_TOKEN_URL_TEMPLATE: &str = "https://oidc.{region}.amazonaws.com/token";
/// Upper bound on a reported token lifetime, independent of what upstream claims.
const EXPIRY_SAFETY_CAP_SECS: i64 = 8 * 60 * 60;

pub struct RefreshOutcome {
    pub access_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct TokenRefresher {
    http: reqwest::Client,
    region: String,
}

impl TokenRefresher {
    pub fn new(region: String, proxy_url: Option<&str>) -> Result<Self, EngineError> {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30));
        if let Some(proxy) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| EngineError::Configuration(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { http, region })
    }

    pub async fn refresh(
        &self,
        account_id: &str,
        credentials: &Credentials,
    ) -> Result<RefreshOutcome, EngineError> {
        let policy = RetryPolicy::refresh_default();
        let account_id_for_log = account_id.to_string();

        let result = retry::retry_with_backoff(
            &policy,
            |_attempt| self.send_refresh(credentials),
            |result: &Result<RefreshOutcome, EngineError>| match result {
                Err(EngineError::UpstreamTransient(_)) => RetryDecision::Retry {
                    reason: RetryReason::ServerError,
                    retry_after: None,
                },
                _ => RetryDecision::DoNotRetry,
            },
            |info| {
                warn!(
                    account = %account_id_for_log,
                    attempt = info.attempt,
                    delay_ms = info.delay.as_millis() as u64,
                    reason = info.reason.as_str(),
                    "retrying token refresh"
                );
            },
        )
        .await;

        // `send_refresh` reports revocation keyed by the OAuth error code; the
        // pool needs it keyed by account id to transition the right account.
        result.map_err(|err| match err {
            EngineError::TokenRevoked(reason) => {
                warn!(account = %account_id_for_log, reason = %reason, "refresh token revoked");
                EngineError::TokenRevoked(account_id_for_log.clone())
            }
            other => other,
        })
    }

    async fn send_refresh(&self, credentials: &Credentials) -> Result<RefreshOutcome, EngineError> {
        use crate::secret::ExposeSecret;

        let (url, params): (String, Vec<(&str, String)>) = match credentials.auth_method {
            AuthMethod::Social => (
                SOCIAL_TOKEN_URL.to_string(),
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    (
                        "refresh_token",
                        credentials.refresh_token.expose_secret().to_string(),
                    ),
                ],
            ),
            AuthMethod::Idc => {
                let client_id = credentials.client_id.clone().ok_or_else(|| {
                    EngineError::Configuration("idc account missing client_id".into())
                })?;
                let client_secret = credentials
                    .client_secret
                    .as_ref()
                    .ok_or_else(|| {
                        EngineError::Configuration("idc account missing client_secret".into())
                    })?
                    .expose_secret()
                    .to_string();
                let region = credentials.region.clone().unwrap_or_else(|| self.region.clone());
                (
                    IDC_TOKEN_URL_TEMPLATE.replace("{region}", &region),
                    vec![
                        ("grant_type", "refresh_token".to_string()),
                        (
                            "refresh_token",
                            credentials.refresh_token.expose_secret().to_string(),
                        ),
                        ("clientId", client_id),
                        ("clientSecret", client_secret),
                    ],
                )
            }
        };

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-amz-json-1.1")
            .json(&params.into_iter().collect::<std::collections::HashMap<_, _>>())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    EngineError::UpstreamTransient(e.to_string())
                } else {
                    EngineError::Configuration(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EngineError::UpstreamTransient(format!(
                "refresh endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if is_revocation(&err) {
                    return Err(EngineError::TokenRevoked(err.error));
                }
                return Err(EngineError::Configuration(
                    err.error_description.unwrap_or(err.error),
                ));
            }
            return Err(EngineError::Configuration(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Configuration(format!("invalid refresh response: {e}")))?;

        let ttl = parsed
            .expires_in
            .unwrap_or(EXPIRY_SAFETY_CAP_SECS)
            .clamp(0, EXPIRY_SAFETY_CAP_SECS);
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl);

        Ok(RefreshOutcome {
            access_token: SecretString::new(parsed.access_token),
            expires_at,
        })
    }
}

fn is_revocation(err: &ErrorResponse) -> bool {
    matches!(
        err.error.as_str(),
        "invalid_grant" | "unauthorized_client" | "access_denied"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocation_errors_are_recognized() {
        let err = ErrorResponse {
            error: "invalid_grant".to_string(),
            error_description: None,
        };
        assert!(is_revocation(&err));

        let err = ErrorResponse {
            error: "server_error".to_string(),
            error_description: None,
        };
        assert!(!is_revocation(&err));
    }
}
