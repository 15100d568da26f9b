use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use lookout_common::config::SearchConfig;
use lookout_common::types::SearchResponse;

use crate::error::{Result, SearchError};
use crate::SearchBackend;

/// HTTPS client for the search store with basic auth.
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}://{}:{}", config.protocol, config.host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Reads the body of a non-2xx reply into a `BadResponse`.
    async fn fail(resp: reqwest::Response) -> SearchError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        SearchError::BadResponse { status, body }
    }

    /// Startup connectivity check: cluster health plus a zero-size search.
    pub async fn test_connection(&self) -> Result<()> {
        self.health_probe().await?;

        let probe = json!({"query": {"match_all": {}}, "size": 0});
        let resp = self
            .request(reqwest::Method::POST, "/_search")
            .json(&probe)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_search"))
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }

        let text = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&text)?;
        tracing::debug!(index, total = parsed.total(), "search completed");
        Ok(parsed)
    }

    async fn count(&self, index: &str, body: &Value) -> Result<i64> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_count"))
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }

        let text = resp.text().await?;
        let parsed: Value = serde_json::from_str(&text)?;
        Ok(parsed.get("count").and_then(Value::as_i64).unwrap_or(0))
    }

    async fn index(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("/{index}/_doc/{id}"))
            .json(doc)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }

    async fn index_auto_id(&self, index: &str, doc: &Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_doc"))
            .json(doc)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }

    async fn health_probe(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "/_cluster/health")
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Unavailable(format!(
                "health probe returned status {status}: {body}"
            )));
        }

        let health: Value = resp
            .json()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;
        if health.get("status").and_then(Value::as_str) == Some("red") {
            return Err(SearchError::Unavailable("cluster status is red".into()));
        }
        Ok(())
    }
}
