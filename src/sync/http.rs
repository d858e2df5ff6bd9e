//! HTTP client seam used to replay queued operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{OfflineError, Result};
use crate::sync::HttpMethod;

// == HTTP Response ==
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub data: Value,
}

// == HTTP Client ==
/// Client capable of sending mutating requests. Any error, including an
/// unsuccessful status, marks the operation for retry.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, endpoint: &str, data: &Value) -> Result<HttpResponse>;

    async fn put(&self, endpoint: &str, data: &Value) -> Result<HttpResponse>;

    async fn patch(&self, endpoint: &str, data: &Value) -> Result<HttpResponse>;

    async fn delete(&self, endpoint: &str, data: Option<&Value>) -> Result<HttpResponse>;
}

/// Dispatches one request by method. `DELETE` sends no body when `data` is null.
pub async fn execute(
    client: &dyn HttpClient,
    method: HttpMethod,
    endpoint: &str,
    data: &Value,
) -> Result<HttpResponse> {
    match method {
        HttpMethod::Post => client.post(endpoint, data).await,
        HttpMethod::Put => client.put(endpoint, data).await,
        HttpMethod::Patch => client.patch(endpoint, data).await,
        HttpMethod::Delete => {
            let body = if data.is_null() { None } else { Some(data) };
            client.delete(endpoint, body).await
        }
    }
}

// == HTTP Clients ==
/// Clients keyed by queue name, with an optional fallback for unlisted queues.
#[derive(Clone, Default)]
pub struct HttpClients {
    by_queue: HashMap<String, Arc<dyn HttpClient>>,
    fallback: Option<Arc<dyn HttpClient>>,
}

impl HttpClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// One client for every queue.
    pub fn shared(client: Arc<dyn HttpClient>) -> Self {
        Self {
            by_queue: HashMap::new(),
            fallback: Some(client),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        self.by_queue.insert(queue.into(), client);
        self
    }

    pub fn with_fallback(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.fallback = Some(client);
        self
    }

    pub fn insert(&mut self, queue: impl Into<String>, client: Arc<dyn HttpClient>) {
        self.by_queue.insert(queue.into(), client);
    }

    pub fn for_queue(&self, queue: &str) -> Option<Arc<dyn HttpClient>> {
        self.by_queue
            .get(queue)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_queue.is_empty() && self.fallback.is_none()
    }
}

// == Reqwest HTTP Client ==
/// JSON client that joins endpoints onto a base URL.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestHttpClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OfflineError::Http(format!("{}: {}", status, body)));
        }

        // Empty bodies (204) decode as null
        let bytes = response.bytes().await?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        debug!("HTTP {} ok", status);

        Ok(HttpResponse { data })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(&self, endpoint: &str, data: &Value) -> Result<HttpResponse> {
        self.send(self.client.post(self.url(endpoint)).json(data)).await
    }

    async fn put(&self, endpoint: &str, data: &Value) -> Result<HttpResponse> {
        self.send(self.client.put(self.url(endpoint)).json(data)).await
    }

    async fn patch(&self, endpoint: &str, data: &Value) -> Result<HttpResponse> {
        self.send(self.client.patch(self.url(endpoint)).json(data)).await
    }

    async fn delete(&self, endpoint: &str, data: Option<&Value>) -> Result<HttpResponse> {
        let mut request = self.client.delete(self.url(endpoint));
        if let Some(data) = data {
            request = request.json(data);
        }
        self.send(request).await
    }
}
