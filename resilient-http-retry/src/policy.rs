//! Retry policy configuration and its normalisation.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::PolicyError;
use crate::request::FailedRequest;

/// A bundle of retry rules: which failures are retried, how often, and how long to wait.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyEntry {
    /// HTTP methods this entry applies to, compared case-insensitively.
    pub methods: Vec<String>,
    /// Maximum number of retries. Zero or negative disables retrying.
    pub retries: i64,
    /// Delay before the first retry, and the base of the backoff.
    pub retry_delay_ms: u64,
    /// Response statuses that trigger a retry.
    pub response_status_codes: Vec<u16>,
    /// Backoff growth factor. `0` and `1` keep the delay constant.
    pub exponent: f64,
}

/// A [`RetryPolicyEntry`] scoped to the URLs matching at least one of `url_regexes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyOverride {
    pub url_regexes: Vec<UrlPattern>,
    #[serde(flatten)]
    pub policy: RetryPolicyEntry,
}

/// Retry configuration as supplied by the application, where every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyConfig {
    /// Used for requests no override applies to. The library default is used when absent.
    #[serde(default)]
    pub default: Option<RetryPolicyEntry>,
    /// Checked in order before the default, the first applicable one wins.
    #[serde(default)]
    pub overrides: Option<Vec<RetryPolicyOverride>>,
}

/// A complete retry configuration, see [`normalize_policy`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRetryPolicy {
    pub default: RetryPolicyEntry,
    pub overrides: Vec<RetryPolicyOverride>,
}

/// A URL regex, matched anywhere in the URL the request was made with.
///
/// That URL is the one handed to the client, so with a base URL configured it is usually a
/// relative path such as `/users/42`. Patterns are not anchored: `api` matches every URL
/// containing `api`. Use `^`/`$` to pin a pattern to the start or end of the URL.
#[derive(Debug, Clone)]
pub struct UrlPattern(Regex);

/// The built-in entry used when no default is configured.
pub fn default_policy() -> RetryPolicyEntry {
    RetryPolicyEntry {
        methods: ["DELETE", "GET", "PATCH", "POST", "PUT"]
            .into_iter()
            .map(String::from)
            .collect(),
        retries: 3,
        retry_delay_ms: 1000,
        response_status_codes: vec![401, 403, 404, 500],
        exponent: 1.0,
    }
}

/// Completes a possibly partial configuration.
///
/// A missing default is replaced by [`default_policy`] as a whole, a supplied default is kept
/// verbatim. Missing overrides become an empty list.
pub fn normalize_policy(config: Option<RetryPolicyConfig>) -> NormalizedRetryPolicy {
    let RetryPolicyConfig { default, overrides } = config.unwrap_or_default();

    let default = default.unwrap_or_else(|| {
        tracing::debug!(
            "No default configuration values provided in retry policy configuration, using library defaults."
        );
        default_policy()
    });

    NormalizedRetryPolicy {
        default,
        overrides: overrides.unwrap_or_default(),
    }
}

impl RetryPolicyEntry {
    /// Whether a failed request matches this entry's methods and status codes.
    ///
    /// A failure without a response status (connection refused, timeout...) never matches.
    pub fn is_applicable(&self, failed: &FailedRequest<'_>) -> bool {
        let method_matches = self
            .methods
            .iter()
            .any(|method| method.eq_ignore_ascii_case(failed.method.as_str()));

        let status_matches = failed
            .status
            .map(|status| self.response_status_codes.contains(&status.as_u16()))
            .unwrap_or(false);

        method_matches && status_matches
    }
}

impl RetryPolicyOverride {
    /// Whether the request URL matches one of the patterns and the entry itself applies.
    pub fn is_applicable(&self, failed: &FailedRequest<'_>) -> bool {
        let url_matches = self
            .url_regexes
            .iter()
            .any(|pattern| pattern.is_match(failed.url));

        url_matches && self.policy.is_applicable(failed)
    }
}

impl NormalizedRetryPolicy {
    /// Picks the entry governing `failed`: the first applicable override, else the default when
    /// it applies. `None` means the failure must not be retried.
    pub fn select(&self, failed: &FailedRequest<'_>) -> Option<&RetryPolicyEntry> {
        self.overrides
            .iter()
            .find(|entry| entry.is_applicable(failed))
            .map(|entry| &entry.policy)
            .or_else(|| {
                Some(&self.default).filter(|default| default.is_applicable(failed))
            })
    }
}

impl From<RetryPolicyConfig> for NormalizedRetryPolicy {
    fn from(config: RetryPolicyConfig) -> Self {
        normalize_policy(Some(config))
    }
}

impl Default for NormalizedRetryPolicy {
    fn default() -> Self {
        normalize_policy(None)
    }
}

impl RetryPolicyConfig {
    /// Parses a retry policy document:
    ///
    /// ```
    /// # use resilient_http_retry::RetryPolicyConfig;
    /// let config = RetryPolicyConfig::from_json(r#"{
    ///     "overrides": [{
    ///         "urlRegexes": ["api\\.example\\.com"],
    ///         "methods": ["GET"],
    ///         "retries": 2,
    ///         "retryDelayMs": 100,
    ///         "responseStatusCodes": [500],
    ///         "exponent": 2
    ///     }]
    /// }"#).unwrap();
    /// assert!(config.default.is_none());
    /// assert_eq!(config.overrides.unwrap()[0].policy.retries, 2);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, PolicyError> {
        Regex::new(pattern)
            .map(UrlPattern)
            .map_err(|source| PolicyError::InvalidUrlPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.0.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Regex> for UrlPattern {
    fn from(regex: Regex) -> Self {
        UrlPattern(regex)
    }
}

impl FromStr for UrlPattern {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UrlPattern::new(s)
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UrlPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        UrlPattern::new(&pattern).map_err(serde::de::Error::custom)
    }
}
