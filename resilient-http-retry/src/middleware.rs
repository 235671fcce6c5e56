//! `RetryPolicyMiddleware` implements retrying failed requests according to a declarative policy.

use std::sync::Arc;

use anyhow::anyhow;
use http::Extensions;
use reqwest::{Request, Response};
use resilient_http::{Error, Middleware, Next, RequestedUrl, Result};

use crate::backoff::retry_delay;
use crate::policy::{
    normalize_policy, NormalizedRetryPolicy, RetryPolicyConfig, RetryPolicyEntry,
};
use crate::request::FailedRequest;
use crate::state::RetryState;

/// `RetryPolicyMiddleware` retries requests whose failure is covered by a retry policy.
///
/// On every failed attempt the policy picks the applicable entry (first matching override, then
/// the default). The request is reissued, after the entry's backoff delay, until it succeeds or
/// the entry's `retries` budget is spent. The caller then receives the last error unchanged.
///
/// URL patterns are matched against the URL given to the client (see [`RequestedUrl`]), or the
/// absolute request URL when the request was built elsewhere. A call always starts with the full
/// retry budget, whatever [`RetryState`] the extensions already hold.
///
/// Only responses with a status are candidates for a retry. Transport failures, timeouts
/// included, are returned on the first attempt whatever the policy says.
///
///```rust
///     use resilient_http::ClientConfig;
///     use resilient_http_retry::{RetryPolicyConfig, RetryPolicyMiddleware};
///
///     let policy = RetryPolicyConfig::from_json(r#"{
///         "overrides": [{
///             "urlRegexes": ["api\\.example\\.com"],
///             "methods": ["GET"],
///             "retries": 2,
///             "retryDelayMs": 100,
///             "responseStatusCodes": [500],
///             "exponent": 2
///         }]
///     }"#).unwrap();
///
///     let client = ClientConfig::default()
///         .build()
///         .unwrap()
///         .with(RetryPolicyMiddleware::new(Some(policy)))
///         .build();
///```
///
#[derive(Debug, Clone)]
pub struct RetryPolicyMiddleware {
    policy: Arc<NormalizedRetryPolicy>,
}

impl RetryPolicyMiddleware {
    /// Construct `RetryPolicyMiddleware` from a possibly partial configuration, falling back to
    /// the library defaults for what is missing.
    pub fn new(config: Option<RetryPolicyConfig>) -> Self {
        Self::new_with_policy(normalize_policy(config))
    }

    pub fn new_with_policy(policy: NormalizedRetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &NormalizedRetryPolicy {
        &self.policy
    }
}

impl Default for RetryPolicyMiddleware {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait::async_trait]
impl Middleware for RetryPolicyMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        self.execute_with_retry(req, next, extensions).await
    }
}

impl RetryPolicyMiddleware {
    /// This function will try to execute the request, if it fails with an error covered by the
    /// policy it will wait and reissue a clone of the original request.
    async fn execute_with_retry<'a>(
        &'a self,
        req: Request,
        next: Next<'a>,
        extensions: &'a mut Extensions,
    ) -> Result<Response> {
        let target = match extensions.get::<RequestedUrl>() {
            Some(requested) => requested.as_str().to_owned(),
            None => req.url().to_string(),
        };
        // Every call starts with the full budget, even when `extensions` is reused.
        extensions.remove::<RetryState>();
        let mut state = RetryState::default();

        loop {
            // Cloning the request object before-the-fact is not ideal..
            // However, if the body of the request is not static, e.g of type `Bytes`,
            // the Clone operation should be of constant complexity and not O(N)
            // since the byte abstraction is a shared pointer over a buffer.
            let duplicate_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not clonable. Are you passing a streaming body?"
                ))
            })?;

            let error = match next.run(duplicate_request, extensions).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let failed = FailedRequest::new(req.method(), &target, &error);
            let Some(entry) = self.policy.select(&failed) else {
                return Err(error);
            };

            if !has_retries_left(entry, &state) {
                tracing::debug!(
                    method = %failed.method,
                    url = %failed.url,
                    retries = entry.retries,
                    "Retries exhausted, returning the last error"
                );
                return Err(error);
            }

            state.retry_number += 1;
            extensions.insert(state);
            let delay = retry_delay(entry.exponent, state.retry_number, entry.retry_delay_ms);
            log_retry(&failed, &error, entry, state.retry_number, delay.as_secs_f64());

            tokio::time::sleep(delay).await;
        }
    }
}

fn has_retries_left(entry: &RetryPolicyEntry, state: &RetryState) -> bool {
    entry.retries > 0 && i64::from(state.retry_number) < entry.retries
}

/// Only the status, status text and body of the failed response are logged: headers may carry
/// credentials.
fn log_retry(
    failed: &FailedRequest<'_>,
    error: &Error,
    entry: &RetryPolicyEntry,
    retry_number: u32,
    delay_secs: f64,
) {
    let (status, status_text, data) = match error.status_error() {
        Some(response) => (
            response.status.as_u16(),
            response.status_text(),
            response.body_text().into_owned(),
        ),
        None => (0, "", String::new()),
    };

    tracing::warn!(
        method = %failed.method,
        url = %failed.url,
        retry_number,
        retries = entry.retries,
        delay_secs,
        error.status = status,
        error.status_text = status_text,
        error.data = %data,
        "The HTTP [{}] request to URL [{}] failed. Retry [{}] of [{}] will be performed in [{}] seconds.",
        failed.method,
        failed.url,
        retry_number,
        entry.retries,
        delay_secs,
    );
}
