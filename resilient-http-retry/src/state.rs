/// Retry bookkeeping for one logical request.
///
/// [`RetryPolicyMiddleware`](crate::RetryPolicyMiddleware) keeps it in the request's
/// [`Extensions`](http::Extensions). Any value already there is discarded when a call starts, the
/// middleware then records each retry it issues. Callers using
/// [`execute_with_extensions`](resilient_http::ClientWithMiddleware::execute_with_extensions)
/// can read it afterwards to find out how many retries were made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Number of retries issued so far. Only ever incremented.
    pub retry_number: u32,
}
