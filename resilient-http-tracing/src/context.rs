use std::future::Future;

/// Header used to propagate the correlation id to downstream services.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Runs `future` with `correlation_id` as the ambient correlation id.
///
/// Requests sent from within `future` through a client carrying
/// [`CorrelationIdMiddleware`](crate::CorrelationIdMiddleware) are tagged with it.
///
/// ```
/// # async fn run() {
/// use resilient_http_tracing::{current_correlation_id, with_correlation_id};
///
/// let seen = with_correlation_id("req-123", async { current_correlation_id() }).await;
/// assert_eq!(seen.as_deref(), Some("req-123"));
/// assert_eq!(current_correlation_id(), None);
/// # }
/// ```
pub async fn with_correlation_id<F>(correlation_id: impl Into<String>, future: F) -> F::Output
where
    F: Future,
{
    CORRELATION_ID.scope(correlation_id.into(), future).await
}

/// The ambient correlation id, if the current task runs inside [`with_correlation_id`].
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(Clone::clone).ok()
}
