//! Correlation id propagation for [`resilient_http`] clients.
//!
//! Wrap the handling of an inbound request in [`with_correlation_id`] and attach
//! [`CorrelationIdMiddleware`] to your client: every outbound call made while handling that
//! request carries the same `x-correlation-id` header.
//!
//! ```rust
//! use resilient_http::ClientConfig;
//! use resilient_http_tracing::{with_correlation_id, CorrelationIdMiddleware};
//!
//! async fn handle_inbound(correlation_id: String) {
//!     let client = ClientConfig::default()
//!         .build()
//!         .unwrap()
//!         .with(CorrelationIdMiddleware::new())
//!         .build();
//!
//!     with_correlation_id(correlation_id, async {
//!         let _ = client.get("https://api.example.com/health").send().await;
//!     })
//!     .await;
//! }
//! ```

mod context;
mod middleware;

pub use context::{current_correlation_id, with_correlation_id, X_CORRELATION_ID};
pub use middleware::CorrelationIdMiddleware;
