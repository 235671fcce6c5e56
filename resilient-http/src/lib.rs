//! This crate provides [`ClientWithMiddleware`], a wrapper around [`reqwest::Client`] with the
//! ability to attach middleware which runs on every request.
//!
//! Build the client from a [`ClientConfig`] (or wrap an existing reqwest client with
//! [`ClientBuilder`]), attach middleware using [`with`] and finalize it with [`build`]. From then
//! on sending requests is the same as with reqwest, except that responses outside of the `2xx`
//! range are returned as [`Error::Status`]:
//!
//! ```
//! use http::Extensions;
//! use reqwest::{Request, Response};
//! use resilient_http::{ClientConfig, Middleware, Next, Result};
//!
//! struct LoggingMiddleware;
//!
//! #[async_trait::async_trait]
//! impl Middleware for LoggingMiddleware {
//!     async fn handle(
//!         &self,
//!         req: Request,
//!         extensions: &mut Extensions,
//!         next: Next<'_>,
//!     ) -> Result<Response> {
//!         println!("Request started {:?}", req);
//!         let res = next.run(req, extensions).await;
//!         println!("Result: {:?}", res);
//!         res
//!     }
//! }
//!
//! async fn run() {
//!     let config = ClientConfig {
//!         base_url: Some("https://api.example.com/".to_string()),
//!         ..Default::default()
//!     };
//!     let client = config.build().unwrap().with(LoggingMiddleware).build();
//!     match client.get("users/42").send().await {
//!         Ok(resp) => println!("user: {}", resp.text().await.unwrap()),
//!         Err(err) => println!("lookup failed with status {:?}", err.status()),
//!     }
//! }
//! ```
//!
//! [`build`]: ClientBuilder::build
//! [`with`]: ClientBuilder::with
mod client;
mod config;
mod error;
mod middleware;

pub use client::{ClientBuilder, ClientWithMiddleware, RequestBuilder, RequestedUrl};
pub use config::ClientConfig;
pub use error::{ConfigError, Error, Result, StatusError};
pub use middleware::{BoxFuture, Middleware, Next};
