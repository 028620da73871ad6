//! HTTP client for the restaurant reviews service.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::RemoteError;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Remote resources exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Restaurants,
    Reviews,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Restaurants => "restaurants",
            Resource::Reviews => "reviews",
        }
    }

    /// Query parameter used to select children of a parent entity.
    pub fn parent_param(&self) -> Option<&'static str> {
        match self {
            Resource::Restaurants => None,
            Resource::Reviews => Some("restaurant_id"),
        }
    }
}

/// Typed request/response access to the remote service.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Fetch every item of a resource.
    async fn read_collection(&self, resource: Resource) -> Result<Value, RemoteError>;

    /// Fetch one item by id.
    async fn read_by_id(&self, resource: Resource, id: u64) -> Result<Value, RemoteError>;

    /// Fetch the items that belong to `parent_id`.
    async fn read_by_parent(&self, resource: Resource, parent_id: u64) -> Result<Value, RemoteError>;

    /// Create an item from a JSON payload.
    async fn write(&self, resource: Resource, payload: &Value) -> Result<Value, RemoteError>;

    /// Update an item through query parameters.
    async fn update(
        &self,
        resource: Resource,
        id: u64,
        params: &[(&str, String)],
    ) -> Result<Value, RemoteError>;
}

/// Run a remote call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout { limit }),
    }
}

/// `reqwest`-backed endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpRemote {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Unreachable(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn classify(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                limit: self.timeout,
            }
        } else {
            e.into()
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(&self, response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status.as_u16(), &body))
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        debug!(%method, %url, "Remote request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let response = self.check_response(response).await?;
        let text = response.text().await.map_err(|e| self.classify(e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn read_collection(&self, resource: Resource) -> Result<Value, RemoteError> {
        let url = self.url(&[resource.path()])?;
        self.send(Method::GET, url, None).await
    }

    async fn read_by_id(&self, resource: Resource, id: u64) -> Result<Value, RemoteError> {
        let url = self.url(&[resource.path(), &id.to_string()])?;
        self.send(Method::GET, url, None).await
    }

    async fn read_by_parent(&self, resource: Resource, parent_id: u64) -> Result<Value, RemoteError> {
        let param = resource.parent_param().ok_or_else(|| {
            RemoteError::InvalidPayload(format!("{} have no parent resource", resource.path()))
        })?;
        let mut url = self.url(&[resource.path()])?;
        url.query_pairs_mut().append_pair(param, &parent_id.to_string());
        self.send(Method::GET, url, None).await
    }

    async fn write(&self, resource: Resource, payload: &Value) -> Result<Value, RemoteError> {
        let url = self.url(&[resource.path()])?;
        self.send(Method::POST, url, Some(payload)).await
    }

    async fn update(
        &self,
        resource: Resource,
        id: u64,
        params: &[(&str, String)],
    ) -> Result<Value, RemoteError> {
        // The service expects a trailing slash on update routes
        let mut url = self.url(&[resource.path(), &id.to_string(), ""])?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }
        self.send(Method::PUT, url, None).await
    }
}
