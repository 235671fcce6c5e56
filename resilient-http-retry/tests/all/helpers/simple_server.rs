use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A TCP server writing canned raw HTTP responses, one per connection.
///
/// Useful to produce responses that are not valid HTTP, which wiremock cannot do.
pub struct SimpleServer {
    listener: TcpListener,
    port: u16,
    host: String,
    raw_http_responses: Vec<String>,
    connections: Arc<AtomicU32>,
}

impl SimpleServer {
    pub async fn new(host: &str, raw_http_responses: Vec<String>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(format!("{}:0", host)).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            port,
            host: host.to_string(),
            raw_http_responses,
            connections: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Shared counter of the connections accepted so far.
    pub fn connections(&self) -> Arc<AtomicU32> {
        self.connections.clone()
    }

    pub async fn start(self) {
        loop {
            let Ok((mut stream, _)) = self.listener.accept().await else {
                continue;
            };
            let index = self.connections.fetch_add(1, Ordering::SeqCst) as usize;
            let response = self
                .raw_http_responses
                .get(index)
                .or_else(|| self.raw_http_responses.last())
                .cloned()
                .unwrap_or_default();

            // 1024 bytes is enough for the request line and headers of a test request
            let mut buffer = [0; 1024];
            if stream.read(&mut buffer).await.is_err() {
                continue;
            }
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    }
}
