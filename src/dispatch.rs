//! Request Dispatcher — wires Model Resolver, Account Pool, Token Refresher,
//! Request Translator and the Upstream Call into the single request-handling
//! path described in §2's data flow: resolve the model name, select an
//! account (its `requestCount` moves atomically with the choice, §4.3),
//! ensure a valid access token, translate the body, then call upstream
//! through the degradation retry engine.
//!
//! On a rate-limited or revoked-token outcome the account transitions state
//! (`cooldown`/`invalid`) and a different account is tried, per §7's
//! propagation rule ("account-selection and upstream errors can trigger
//! re-selection; refresh errors are account-local and do not poison the
//! pool").

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::accounts::AccountPool;
use crate::config::CompatMode;
use crate::error::EngineError;
use crate::logs::{LogBuffer, LogRecord};
use crate::models::ModelResolver;
use crate::refresh::TokenRefresher;
use crate::secret::SecretString;
use crate::translate::{self, ForeignRequest};
use crate::upstream::{UpstreamClient, UpstreamResponse};

/// Upper bound on distinct accounts tried for one incoming request: a
/// `TokenRevoked` retries with another account once, a `UpstreamRateLimited`
/// up to twice (§7) — three attempts covers the worse of the two.
const MAX_ACCOUNT_ATTEMPTS: u32 = 3;

pub struct RequestDispatcher {
    pool: Arc<AccountPool>,
    refresher: TokenRefresher,
    upstream: UpstreamClient,
    resolver: ModelResolver,
    logs: Arc<LogBuffer>,
    token_safety_margin: Duration,
}

impl RequestDispatcher {
    pub fn new(
        pool: Arc<AccountPool>,
        refresher: TokenRefresher,
        upstream: UpstreamClient,
        resolver: ModelResolver,
        logs: Arc<LogBuffer>,
        token_safety_margin: Duration,
    ) -> Self {
        Self {
            pool,
            refresher,
            upstream,
            resolver,
            logs,
            token_safety_margin,
        }
    }

    /// Handle one incoming request end to end, returning the streamed
    /// upstream response. `model` is the caller-facing model name from the
    /// request; `session_id` is only used to label the completed call in the
    /// log ring buffer.
    pub async fn handle(
        &self,
        session_id: &str,
        model: &str,
        request: &ForeignRequest,
        compat_mode: CompatMode,
    ) -> Result<UpstreamResponse, EngineError> {
        let internal_model = self.resolver.resolve(model)?;

        let mut last_err = EngineError::NoAvailableAccount;
        for _ in 0..MAX_ACCOUNT_ATTEMPTS {
            let account_id = self.pool.select().await?;

            let outcome = self
                .try_account(&account_id, &internal_model, request, compat_mode)
                .await;

            self.record_log(session_id, model, &outcome);

            match outcome {
                Ok(response) => return Ok(response),
                Err(EngineError::UpstreamRateLimited(id)) => {
                    warn!(account = %id, "upstream rate-limited account, retrying with another");
                    self.pool.record_rate_limited(&id).await;
                    last_err = EngineError::UpstreamRateLimited(id);
                }
                Err(EngineError::TokenRevoked(id)) => {
                    warn!(account = %id, "refresh token revoked, retrying with another account");
                    self.pool.mark_invalid(&id).await;
                    last_err = EngineError::TokenRevoked(id);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    async fn try_account(
        &self,
        account_id: &str,
        internal_model: &str,
        request: &ForeignRequest,
        compat_mode: CompatMode,
    ) -> Result<UpstreamResponse, EngineError> {
        let store = self.pool.credential_store();
        let account = store
            .get(account_id)
            .await
            .ok_or_else(|| EngineError::Configuration(format!("unknown account {account_id}")))?;

        let access_token = store
            .ensure_valid_token(account_id, &self.refresher, self.token_safety_margin)
            .await?;

        let (body, _tool_names) = translate::translate_request(
            request,
            internal_model,
            account.credentials.profile_arn.as_deref(),
        )?;

        let mut credentials = account.credentials.clone();
        credentials.access_token = Some(SecretString::new(access_token));
        let machine_id = credentials.machine_id.clone().unwrap_or_default();

        self.upstream
            .send(body, &credentials, &machine_id, account_id, compat_mode)
            .await
    }

    fn record_log(&self, session_id: &str, model: &str, outcome: &Result<UpstreamResponse, EngineError>) {
        let (status_code, status_text) = match outcome {
            Ok(response) => (response.status, "ok".to_string()),
            Err(err) => (err.status_code().unwrap_or(0), err.to_string()),
        };
        self.logs.push(LogRecord {
            timestamp: chrono::Utc::now(),
            session_id: session_id.to_string(),
            model: model.to_string(),
            status_code,
            status_text,
        });
    }
}
