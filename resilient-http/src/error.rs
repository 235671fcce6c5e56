use std::borrow::Cow;
use std::fmt;

use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode, Url};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// There was an error running some middleware
    #[error("Middleware error: {0}")]
    Middleware(#[from] anyhow::Error),
    /// Error from the underlying reqwest client, no response was received
    #[error("Request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// A response was received but its status is not in the `2xx` range
    #[error("Response error: {0}")]
    Status(Box<StatusError>),
}

impl Error {
    pub fn middleware<E>(err: E) -> Self
    where
        E: 'static + Send + Sync + std::error::Error,
    {
        Error::Middleware(err.into())
    }

    /// Returns a possible URL related to this error.
    pub fn url(&self) -> Option<&Url> {
        match self {
            Error::Middleware(_) => None,
            Error::Reqwest(e) => e.url(),
            Error::Status(e) => Some(&e.url),
        }
    }

    /// Returns the status code, if the error was generated from a response.
    ///
    /// Transport failures (connect, timeout, malformed responses) never carry a status.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Middleware(_) => None,
            Error::Reqwest(e) => e.status(),
            Error::Status(e) => Some(e.status),
        }
    }

    /// Returns the failed response details when the error was built from a non-`2xx` response.
    pub fn status_error(&self) -> Option<&StatusError> {
        match self {
            Error::Status(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the error is related to a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true if the error is related to connect
    pub fn is_connect(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_connect(),
            _ => false,
        }
    }

    /// Returns true if the error is from a type Builder.
    pub fn is_builder(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_builder(),
            _ => false,
        }
    }

    /// Returns true if a response was received and rejected because of its status.
    pub fn is_status(&self) -> bool {
        match self {
            Error::Middleware(_) => false,
            Error::Reqwest(e) => e.is_status(),
            Error::Status(_) => true,
        }
    }
}

impl From<StatusError> for Error {
    fn from(err: StatusError) -> Self {
        Error::Status(Box::new(err))
    }
}

/// A response that came back with a status outside of the `2xx` range.
///
/// The body is buffered so it can be inspected (and logged) after the connection is released.
#[derive(Debug, Clone)]
pub struct StatusError {
    pub method: Method,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl StatusError {
    /// Drains `response` into a `StatusError`.
    ///
    /// A body that fails to download is logged at debug level and recorded as empty.
    pub async fn from_response(method: Method, response: Response) -> Self {
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(error) => {
                tracing::debug!(
                    %method,
                    %url,
                    %status,
                    %error,
                    "Could not read the body of a failed response"
                );
                Vec::new()
            }
        };

        StatusError {
            method,
            url,
            status,
            headers,
            body,
        }
    }

    /// The canonical reason phrase of the status, e.g. `Not Found`.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.status.is_client_error() {
            "client error"
        } else if self.status.is_server_error() {
            "server error"
        } else {
            "unexpected status"
        };
        write!(
            f,
            "HTTP {} ({}) for {} {}",
            kind, self.status, self.method, self.url
        )
    }
}

impl std::error::Error for StatusError {}

/// Errors raised while turning a [`ClientConfig`](crate::ClientConfig) into a client.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid default header name `{0}`")]
    InvalidHeaderName(String, #[source] http::header::InvalidHeaderName),
    #[error("invalid value for default header `{0}`")]
    InvalidHeaderValue(String, #[source] http::header::InvalidHeaderValue),
    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
