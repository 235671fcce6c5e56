use reqwest::{Method, StatusCode};
use resilient_http::Error;

/// What the retry policy looks at when a request fails: the method, the URL as the caller wrote
/// it, and the response status when a response was received at all.
#[derive(Debug, Clone, Copy)]
pub struct FailedRequest<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub status: Option<StatusCode>,
}

impl<'a> FailedRequest<'a> {
    pub fn new(method: &'a Method, url: &'a str, error: &Error) -> Self {
        FailedRequest {
            method,
            url,
            status: error.status(),
        }
    }
}
