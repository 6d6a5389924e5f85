//! HTTP client for talking to a running node.

use agentlink_types::config::AgentConfig;
use agentlink_types::identity::{sign_payload, SharedSecretSigner};
use agentlink_types::rpc::{RpcId, RpcRequest, PING_METHOD};
use anyhow::{bail, Context};
use serde_json::Value;
use std::time::Duration;

const AGENT_ID_HEADER: &str = "x-agent-id";
const TIMESTAMP_HEADER: &str = "x-a2a-timestamp";
const SIGNATURE_HEADER: &str = "x-a2a-signature";

/// Base URL of the node described by `config`.
pub fn node_url(config: &AgentConfig) -> String {
    // 0.0.0.0 is a bind address, not a destination.
    let addr = config.api_listen.replace("0.0.0.0", "127.0.0.1");
    format!("http://{addr}")
}

/// Headers that authenticate an RPC call with the shared secret.
pub fn signed_headers(config: &AgentConfig, params: &Value) -> anyhow::Result<Vec<(&'static str, String)>> {
    if config.security.shared_secret.is_empty() {
        bail!("--sign needs security.shared_secret in the config");
    }
    let signer = SharedSecretSigner::new(config.agent_id.clone(), config.security.shared_secret.clone());
    Ok(vec![
        (AGENT_ID_HEADER, config.agent_id.clone()),
        (TIMESTAMP_HEADER, chrono::Utc::now().to_rfc3339()),
        (SIGNATURE_HEADER, sign_payload(&signer, &config.agent_id, params)),
    ])
}

pub struct NodeClient {
    base: String,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn json(&self, request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Cannot reach node at {} (is `agentlink start` running?)", self.base))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or_default();
        if status.is_server_error() {
            bail!("Node returned {status}: {body}");
        }
        Ok(body)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.json(self.http.get(format!("{}{path}", self.base))).await
    }

    fn peers_request(&self, capability: Option<&str>, refresh: bool) -> reqwest::RequestBuilder {
        let request = if refresh {
            self.http.post(format!("{}/api/peers/discover", self.base))
        } else {
            self.http.get(format!("{}/api/peers", self.base))
        };
        match capability {
            Some(capability) => request.query(&[("capability", capability)]),
            None => request,
        }
    }

    /// Known peers; with `refresh`, ask the node to query the registry first.
    pub async fn peers(&self, capability: Option<&str>, refresh: bool) -> anyhow::Result<Value> {
        self.json(self.peers_request(capability, refresh)).await
    }

    /// Send one RPC call.
    pub async fn rpc(
        &self,
        method: &str,
        params: Value,
        headers: &[(&'static str, String)],
    ) -> anyhow::Result<Value> {
        let id = RpcId::from(uuid::Uuid::new_v4().to_string().as_str());
        let request = RpcRequest::new(method, params, Some(id));
        let mut builder = self
            .http
            .post(format!("{}/rpc", self.base))
            .json(&request);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        self.json(builder).await
    }

    pub async fn ping(&self) -> anyhow::Result<Value> {
        self.rpc(PING_METHOD, serde_json::json!({}), &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_types::identity::{AgentVerifier, SignatureVerifier};

    #[test]
    fn test_node_url_rewrites_wildcard_bind() {
        let config = AgentConfig {
            api_listen: "0.0.0.0:4300".into(),
            ..AgentConfig::default()
        };
        assert_eq!(node_url(&config), "http://127.0.0.1:4300");
    }

    #[test]
    fn test_peers_query_is_encoded() {
        let client = NodeClient::new("http://127.0.0.1:4300/");
        let request = client
            .peers_request(Some("pay&ship now"), true)
            .build()
            .unwrap();
        assert_eq!(*request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/api/peers/discover");
        let pairs: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("capability".to_string(), "pay&ship now".to_string())]);

        let request = client.peers_request(None, false).build().unwrap();
        assert_eq!(*request.method(), reqwest::Method::GET);
        assert!(request.url().query().is_none());
    }

    #[test]
    fn test_signed_headers_verify() {
        let mut config = AgentConfig::default();
        assert!(signed_headers(&config, &Value::Null).is_err());

        config.security.shared_secret = "s3cret".into();
        let params = serde_json::json!({"amount": 5});
        let headers = signed_headers(&config, &params).unwrap();
        let signature = &headers.iter().find(|(k, _)| *k == SIGNATURE_HEADER).unwrap().1;
        assert!(AgentVerifier::new("s3cret").verify(&config.agent_id, &params, signature));
    }
}
