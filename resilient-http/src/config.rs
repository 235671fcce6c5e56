use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::Deserialize;

use crate::client::ClientBuilder;
use crate::error::ConfigError;

/// Base settings shared by every request a client issues.
///
/// Deserialises from the camelCase JSON shape used by service configuration:
///
/// ```
/// # use resilient_http::ClientConfig;
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "baseUrl": "https://api.example.com/v1/",
///     "headers": { "accept": "application/json" },
///     "timeoutMs": 5000
/// }"#).unwrap();
/// assert_eq!(config.timeout_ms, Some(5000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Relative request URLs are resolved against this URL.
    pub base_url: Option<String>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Total time allowed for a single attempt, from connecting until the body is read.
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Builds the underlying reqwest client and wraps it in a [`ClientBuilder`] so middleware can
    /// be attached.
    pub fn build(&self) -> Result<ClientBuilder, ConfigError> {
        let mut builder = reqwest::Client::builder().default_headers(self.default_headers()?);
        if let Some(timeout) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout));
        }
        if let Some(timeout) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(timeout));
        }

        let client_builder = ClientBuilder::new(builder.build()?);
        match self.base_url()? {
            Some(base_url) => Ok(client_builder.base_url(base_url)),
            None => Ok(client_builder),
        }
    }

    fn base_url(&self) -> Result<Option<Url>, ConfigError> {
        self.base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|source| ConfigError::InvalidBaseUrl {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()
    }

    fn default_headers(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::InvalidHeaderName(name.clone(), e))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ConfigError::InvalidHeaderValue(name.clone(), e))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}
