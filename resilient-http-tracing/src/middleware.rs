use http::header::{HeaderName, HeaderValue};
use http::Extensions;
use reqwest::{Request, Response};
use resilient_http::{Middleware, Next, Result};
use tracing::Instrument;

use crate::context::{current_correlation_id, X_CORRELATION_ID};

/// Middleware stamping outbound requests with the ambient correlation id.
///
/// The `x-correlation-id` header is only added when the request does not already carry one and a
/// correlation id is active (see [`with_correlation_id`](crate::with_correlation_id)). The rest of
/// the chain runs inside an `HTTP request` span, so events logged by inner middleware (retries
/// included) are attributed to the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationIdMiddleware;

impl CorrelationIdMiddleware {
    pub fn new() -> Self {
        CorrelationIdMiddleware
    }
}

#[async_trait::async_trait]
impl Middleware for CorrelationIdMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let header_name = HeaderName::from_static(X_CORRELATION_ID);
        if !req.headers().contains_key(&header_name) {
            if let Some(correlation_id) = current_correlation_id() {
                match HeaderValue::from_str(&correlation_id) {
                    Ok(value) => {
                        req.headers_mut().insert(header_name.clone(), value);
                    }
                    Err(_) => {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            "Correlation id is not a valid header value, not propagating it"
                        );
                    }
                }
            }
        }

        let correlation_id = req
            .headers()
            .get(&header_name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_owned();
        let span = tracing::info_span!(
            "HTTP request",
            http.method = %req.method(),
            http.url = %req.url(),
            correlation_id = %correlation_id,
        );

        next.run(req, extensions).instrument(span).await
    }
}
