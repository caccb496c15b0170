//! Upstream Call (§4.7) — header/URL construction plus the streaming HTTP
//! dispatch, wrapped in the degradation retry engine (§4.6) and the
//! transient-error retry policy (§7 `UpstreamTransient`).
//!
//! Header building stays pure and unit-testable without a network call;
//! the actual send is a separate, retried I/O step.

use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use uuid::Uuid;

use crate::accounts::Credentials;
use crate::error::EngineError;
use crate::fallback::{self, AttemptError};
use crate::retry::{self, RetryPolicy};
use crate::secret::ExposeSecret;

/// Static header asking the upstream to skip telemetry collection for
/// this request. The exact byte value is not specified anywhere public;
/// this is a documented best guess at the literal AWS Q header.
const OPT_OUT_HEADER: &str = "x-amzn-codewhisperer-optout";
const AGENT_MODE_HEADER: &str = "x-amzn-kiro-agent-mode";
const SDK_VERSION: &str = "aws-sdk-js/1.0.27";

pub struct UpstreamClient {
    http: reqwest::Client,
    region: String,
    kiro_version: String,
}

pub struct UpstreamResponse {
    pub status: u16,
    pub stream: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
}

impl UpstreamClient {
    pub fn new(region: String, kiro_version: String, proxy_url: Option<&str>) -> Result<Self, EngineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| EngineError::Configuration(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { http, region, kiro_version })
    }

    pub fn url(&self) -> String {
        upstream_url(&self.region)
    }

    /// Send `body` through the degradation retry engine; each transform's
    /// attempt is itself retried on transient (5xx/network) failure.
    ///
    /// A `429` is surfaced as `EngineError::UpstreamRateLimited(account_id)`
    /// without exhausting the remaining fallback modes — rate limiting is an
    /// account-level condition, not a malformed-request one, and the caller
    /// is expected to retry with a different account (§7).
    pub async fn send(
        &self,
        body: Value,
        credentials: &Credentials,
        machine_id: &str,
        account_id: &str,
        compat_mode: crate::config::CompatMode,
    ) -> Result<UpstreamResponse, EngineError> {
        let access_token = credentials
            .access_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or_else(|| EngineError::Configuration("no access token available for upstream call".into()))?;

        fallback::call_with_fallback(compat_mode, body, |attempt_body| {
            let access_token = access_token.clone();
            async move {
                self.send_once_with_retry(attempt_body, &access_token, machine_id, account_id)
                    .await
            }
        })
        .await
    }

    async fn send_once_with_retry(
        &self,
        body: Value,
        access_token: &str,
        machine_id: &str,
        account_id: &str,
    ) -> Result<UpstreamResponse, AttemptError> {
        let policy = RetryPolicy::upstream_transient();
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| AttemptError::Fatal(EngineError::Configuration(format!("body serialization failed: {e}"))))?;

        let outcome = retry::retry_with_backoff(
            &policy,
            |_attempt| {
                let bytes = bytes.clone();
                async move { self.dispatch(bytes, access_token, machine_id).await }
            },
            |result: &Result<reqwest::Response, reqwest::Error>| retry::classify_reqwest_result(result),
            |_attempt| {},
        )
        .await;

        let response = match outcome {
            Ok(resp) => resp,
            Err(err) => return Err(AttemptError::Fatal(EngineError::UpstreamTransient(err.to_string()))),
        };

        let status = response.status().as_u16();
        if status == 429 {
            return Err(AttemptError::Fatal(EngineError::UpstreamRateLimited(account_id.to_string())));
        }
        if status == 400 {
            let body_text = response.text().await.unwrap_or_default();
            if fallback::is_retryable_rejection(status, &body_text) {
                return Err(AttemptError::Retryable);
            }
            return Err(AttemptError::Fatal(EngineError::UpstreamRejected { summary: body_text }));
        }
        if !response.status().is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(EngineError::UpstreamTransient(format!(
                "upstream returned {status}: {body_text}"
            ))));
        }

        let stream = Box::pin(response.bytes_stream());
        Ok(UpstreamResponse { status, stream })
    }

    async fn dispatch(
        &self,
        bytes: Vec<u8>,
        access_token: &str,
        machine_id: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let headers = build_headers(&self.region, &self.kiro_version, machine_id, access_token);
        self.http
            .post(self.url())
            .headers(headers)
            .body(bytes)
            .send()
            .await
    }
}

pub fn upstream_url(region: &str) -> String {
    format!("https://q.{region}.amazonaws.com/generateAssistantResponse")
}

/// Build the outbound header set for one upstream call (§4.7). Pure and
/// unit-testable without a network round trip.
pub fn build_headers(region: &str, kiro_version: &str, machine_id: &str, access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(HeaderName::from_static(OPT_OUT_HEADER), HeaderValue::from_static("true"));
    headers.insert(HeaderName::from_static(AGENT_MODE_HEADER), HeaderValue::from_static("vibe"));

    let composite_agent = format!("{SDK_VERSION} KiroIDE-{kiro_version}-{machine_id}");
    if let Ok(value) = HeaderValue::from_str(&composite_agent) {
        headers.insert(HeaderName::from_static("x-amz-user-agent"), value.clone());
        headers.insert(reqwest::header::USER_AGENT, value);
    }

    if let Ok(host) = HeaderValue::from_str(&format!("q.{region}.amazonaws.com")) {
        headers.insert(reqwest::header::HOST, host);
    }

    headers.insert(
        HeaderName::from_static("amz-sdk-invocation-id"),
        HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("uuid is valid header value"),
    );
    headers.insert(
        HeaderName::from_static("amz-sdk-request"),
        HeaderValue::from_static("attempt=1; max=3"),
    );

    if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {access_token}")) {
        headers.insert(reqwest::header::AUTHORIZATION, auth);
    }
    headers.insert(reqwest::header::CONNECTION, HeaderValue::from_static("close"));

    headers
}
