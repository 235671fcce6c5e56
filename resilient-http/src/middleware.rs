use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::Extensions;
use reqwest::{Client, Request, Response};

use crate::error::{Result, StatusError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A step of the request pipeline of a [`ClientWithMiddleware`](crate::ClientWithMiddleware).
///
/// Steps run in the order they were attached with
/// [`ClientBuilder::with`](crate::ClientBuilder::with). Each one decides whether, and how many
/// times, the rest of the pipeline runs by calling [`Next::run`]. Responses outside of the `2xx`
/// range come back as [`Error::Status`](crate::Error::Status), so a step only has to look at the
/// `Err` branch to react to failures.
///
/// ```
/// use http::Extensions;
/// use reqwest::header::{HeaderValue, USER_AGENT};
/// use reqwest::{Request, Response};
/// use resilient_http::{Middleware, Next, Result};
///
/// struct UserAgent(HeaderValue);
///
/// #[async_trait::async_trait]
/// impl Middleware for UserAgent {
///     async fn handle(
///         &self,
///         mut req: Request,
///         extensions: &mut Extensions,
///         next: Next<'_>,
///     ) -> Result<Response> {
///         req.headers_mut().insert(USER_AGENT, self.0.clone());
///         next.run(req, extensions).await
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response>;
}

/// The steps that have not run yet, followed by the network call.
///
/// `Next` is `Copy`: running it more than once reissues the request through the same steps.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a Client,
    remaining: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(transport: &'a Client, remaining: &'a [Arc<dyn Middleware>]) -> Self {
        Next {
            transport,
            remaining,
        }
    }

    /// Hands `req` to the next step, or sends it when every step has run.
    pub fn run(
        self,
        req: Request,
        extensions: &'a mut Extensions,
    ) -> BoxFuture<'a, Result<Response>> {
        match self.remaining {
            [step, rest @ ..] => step.handle(req, extensions, Next::new(self.transport, rest)),
            [] => Box::pin(send(self.transport, req)),
        }
    }
}

async fn send(transport: &Client, req: Request) -> Result<Response> {
    let method = req.method().clone();
    let response = transport.execute(req).await?;
    if response.status().is_success() {
        return Ok(response);
    }
    Err(StatusError::from_response(method, response).await.into())
}
