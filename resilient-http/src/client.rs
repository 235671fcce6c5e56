use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Body, Client, Method, Request, Response, Url};

use crate::error::Result;
use crate::middleware::{Middleware, Next};

/// Collects what a [`ClientWithMiddleware`] is made of: the reqwest client that does the I/O, an
/// optional base URL and the middleware to run on every request.
pub struct ClientBuilder {
    http: Client,
    base_url: Option<Url>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ClientBuilder {
    pub fn new(http: Client) -> Self {
        ClientBuilder {
            http,
            base_url: None,
            middleware: Vec::new(),
        }
    }

    /// Resolve relative request URLs against `base_url`.
    ///
    /// Resolution follows [`Url::join`], so a base URL path that should be kept must end with `/`.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Appends `middleware` to the chain. The first middleware attached is the first to see a
    /// request and the last to see its outcome.
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> ClientWithMiddleware {
        ClientWithMiddleware {
            shared: Arc::new(Shared {
                http: self.http,
                base_url: self.base_url,
                middleware: self.middleware.into_boxed_slice(),
            }),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// An HTTP client that runs a middleware chain around every request.
///
/// Cloning is cheap and clones share the connection pool. Unlike a bare reqwest client, a
/// response outside of the `2xx` range resolves to [`Error::Status`](crate::Error::Status).
#[derive(Clone)]
pub struct ClientWithMiddleware {
    shared: Arc<Shared>,
}

struct Shared {
    http: Client,
    base_url: Option<Url>,
    middleware: Box<[Arc<dyn Middleware>]>,
}

/// The URL exactly as it was handed to [`ClientWithMiddleware::request`], before the base URL
/// was applied.
///
/// Requests sent through a [`RequestBuilder`] carry it in their extensions, so middleware can
/// reason about the URL the caller wrote rather than the resolved one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedUrl(String);

impl RequestedUrl {
    pub fn new(url: impl Into<String>) -> Self {
        RequestedUrl(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ClientWithMiddleware {
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a request. Relative URLs are resolved against the base URL.
    ///
    /// A URL that cannot be resolved makes [`RequestBuilder::send`] fail with a builder error.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let inner = match self.resolve(url) {
            Some(resolved) => self.shared.http.request(method, resolved),
            // reqwest reports the parse failure once the request is built
            None => self.shared.http.request(method, url),
        };
        let mut extensions = Extensions::new();
        extensions.insert(RequestedUrl::new(url));

        RequestBuilder {
            client: self.clone(),
            inner,
            extensions,
        }
    }

    fn resolve(&self, url: &str) -> Option<Url> {
        match Url::parse(url) {
            Ok(absolute) => Some(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.shared.base_url.as_ref()?;
                base.join(url).ok()
            }
            Err(_) => None,
        }
    }

    /// Runs `req` through the middleware chain.
    ///
    /// `extensions` is shared by every middleware and keeps what they stored in it once the call
    /// returns. A [`RequestedUrl`] placed in it beforehand is honoured like one set by
    /// [`request`](Self::request).
    pub async fn execute_with_extensions(
        &self,
        req: Request,
        extensions: &mut Extensions,
    ) -> Result<Response> {
        Next::new(&self.shared.http, &self.shared.middleware)
            .run(req, extensions)
            .await
    }
}

impl fmt::Debug for ClientWithMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientWithMiddleware")
            .field("base_url", &self.shared.base_url)
            .field("middleware", &self.shared.middleware.len())
            .finish_non_exhaustive()
    }
}

/// A request being prepared by a [`ClientWithMiddleware`].
#[must_use = "RequestBuilder does nothing until you 'send' it"]
pub struct RequestBuilder {
    client: ClientWithMiddleware,
    inner: reqwest::RequestBuilder,
    extensions: Extensions,
}

impl RequestBuilder {
    pub fn header<K, V>(self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.map_inner(|inner| inner.header(key, value))
    }

    pub fn body<T: Into<Body>>(self, body: T) -> Self {
        self.map_inner(|inner| inner.body(body))
    }

    /// Overrides the client timeout for each attempt of this request.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map_inner(|inner| inner.timeout(timeout))
    }

    /// Builds the request without sending it. The extensions, [`RequestedUrl`] included, are
    /// returned alongside so the request can go through
    /// [`ClientWithMiddleware::execute_with_extensions`] later.
    pub fn build(self) -> reqwest::Result<(Request, Extensions)> {
        Ok((self.inner.build()?, self.extensions))
    }

    pub async fn send(self) -> Result<Response> {
        let RequestBuilder {
            client,
            inner,
            mut extensions,
        } = self;
        let req = inner.build()?;
        client.execute_with_extensions(req, &mut extensions).await
    }

    fn map_inner<F>(self, f: F) -> Self
    where
        F: FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        RequestBuilder {
            inner: f(self.inner),
            ..self
        }
    }
}
