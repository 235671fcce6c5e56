//! Declarative retry policies for [`resilient_http`] clients.
//!
//! A [`RetryPolicyConfig`] holds a default [`RetryPolicyEntry`] and an ordered list of
//! [`RetryPolicyOverride`]s scoped by URL regexes. [`RetryPolicyMiddleware`] consults it every
//! time a request fails and reissues the request, with a constant or exponential backoff, while
//! the applicable entry allows it. [`build_resilient_client`] wires everything into a ready to
//! use client.

mod backoff;
mod error;
mod factory;
mod middleware;
mod policy;
mod request;
mod state;

pub use backoff::{compute_retry_delay, retry_delay};
pub use error::PolicyError;
pub use factory::{build_resilient_client, ResilientHttpOptions};
pub use middleware::RetryPolicyMiddleware;
pub use policy::{
    default_policy, normalize_policy, NormalizedRetryPolicy, RetryPolicyConfig, RetryPolicyEntry,
    RetryPolicyOverride, UrlPattern,
};
pub use request::FailedRequest;
pub use state::RetryState;
