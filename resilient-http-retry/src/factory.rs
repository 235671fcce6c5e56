use resilient_http::{ClientConfig, ClientWithMiddleware, ConfigError};
use resilient_http_tracing::CorrelationIdMiddleware;
use serde::Deserialize;

use crate::error::PolicyError;
use crate::middleware::RetryPolicyMiddleware;
use crate::policy::RetryPolicyConfig;

/// Everything needed to build a retrying client.
///
/// ```
/// # use resilient_http_retry::ResilientHttpOptions;
/// let options = ResilientHttpOptions::from_json(r#"{
///     "client": { "baseUrl": "https://api.example.com/", "timeoutMs": 10000 },
///     "retryPolicy": {
///         "default": {
///             "methods": ["GET", "PUT"],
///             "retries": 2,
///             "retryDelayMs": 250,
///             "responseStatusCodes": [502, 503],
///             "exponent": 2
///         }
///     }
/// }"#).unwrap();
/// assert!(options.propagate_correlation_id);
/// let client = resilient_http_retry::build_resilient_client(options).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilientHttpOptions {
    pub client: ClientConfig,
    /// `None` retries with the library default policy.
    pub retry_policy: Option<RetryPolicyConfig>,
    /// Stamp outbound requests with the ambient correlation id.
    pub propagate_correlation_id: bool,
}

impl Default for ResilientHttpOptions {
    fn default() -> Self {
        ResilientHttpOptions {
            client: ClientConfig::default(),
            retry_policy: None,
            propagate_correlation_id: true,
        }
    }
}

impl ResilientHttpOptions {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds a client with the retry policy installed.
///
/// The correlation id middleware, when enabled, runs first so that the header is set once and
/// every retry of a request carries it.
pub fn build_resilient_client(
    options: ResilientHttpOptions,
) -> Result<ClientWithMiddleware, ConfigError> {
    let ResilientHttpOptions {
        client,
        retry_policy,
        propagate_correlation_id,
    } = options;

    let mut builder = client.build()?;
    if propagate_correlation_id {
        builder = builder.with(CorrelationIdMiddleware::new());
    }

    Ok(builder
        .with(RetryPolicyMiddleware::new(retry_policy))
        .build())
}
