//! Outbound HTTP transport to peer agents.

use agentlink_types::error::LinkError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// A raw response from a peer.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, `Null` when the body was empty or not JSON.
    pub body: serde_json::Value,
}

impl TransportResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends JSON to a peer. Implementations must enforce a hard timeout.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// POST `body` to `url` with extra headers.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<TransportResponse, LinkError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose every call times out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<TransportResponse, LinkError> {
        debug!(url = %url, "POST to peer");
        let mut request = self
            .client
            .post(url)
            .header("User-Agent", "AgentLink/0.2 A2A")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LinkError::Transport(format!("timed out calling {url}"))
            } else {
                LinkError::Transport(format!("request to {url} failed: {e}"))
            }
        })?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LinkError::Transport(format!("reading response from {url}: {e}")))?;
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        Ok(TransportResponse { status, body })
    }
}
