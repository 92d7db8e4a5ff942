//! HTTP transport and the per-base-URL client registry.
//!
//! Requests go through a pluggable [`Transport`]. The default one is backed by
//! `reqwest`; tests and embedders can supply their own. [`ClientRegistry`]
//! hands out one [`HttpClient`] per base URL so every endpoint of a base
//! group shares the same client.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::endpoints::RequestConfig;

use super::query::QueryError;

/// HTTP methods used by queries and mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Fully joined URL.
    pub url: String,
    /// JSON body, absent for GET and DELETE.
    pub body: Option<Value>,
    pub config: Option<RequestConfig>,
}

/// What a [`Transport`] got back. Non-2xx statuses are still responses; the
/// client turns them into [`QueryError::Status`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Decoded JSON body. Empty bodies are `null`, non-JSON bodies a string.
    pub data: Value,
}

impl HttpResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Trait for pluggable HTTP backends.
pub trait Transport: Send + Sync + 'static {
    /// Sends a request. Errors are reserved for requests that produced no
    /// response at all.
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
///
/// Reads `headers` and `timeout` from the request config.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>> {
        let client = self.client.clone();

        Box::pin(async move {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut builder = client.request(method, &request.url);
            if let Some(config) = &request.config {
                for (name, value) in config.headers() {
                    builder = builder.header(name, value);
                }
                if let Some(timeout) = config.timeout() {
                    builder = builder.timeout(timeout);
                }
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| QueryError::NetworkError(e.to_string()))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| QueryError::NetworkError(e.to_string()))?;

            let data = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            };

            Ok(HttpResponse { status, data })
        })
    }
}

/// Joins a base URL and a request URL.
///
/// An absolute `url` is used as is. Otherwise exactly one `/` separates the
/// two parts, and an empty `url` yields the base URL.
pub fn combine_urls(base_url: Option<&str>, url: &str) -> String {
    let base_url = match base_url {
        Some(base) if !base.is_empty() && !is_absolute_url(url) => base,
        _ => return url.to_owned(),
    };

    let base_url = base_url.trim_end_matches('/');
    if url.is_empty() {
        base_url.to_owned()
    } else {
        format!("{base_url}/{}", url.trim_start_matches('/'))
    }
}

fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    url.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// A client bound to one base URL (or none, for the default client).
///
/// Cloning shares the same instance; [`HttpClient::ptr_eq`] tells instances
/// apart.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Option<String>,
    transport: Arc<dyn Transport>,
}

impl HttpClient {
    fn new(base_url: Option<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                base_url,
                transport,
            }),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.inner.base_url.as_deref()
    }

    /// `true` when both handles point at the same client instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn url_for(&self, url: &str) -> String {
        combine_urls(self.base_url(), url)
    }

    /// Sends a request and returns the JSON payload of a 2xx response.
    ///
    /// # Errors
    ///
    /// Transport failures are passed through; non-2xx responses become
    /// [`QueryError::Status`].
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        config: Option<&RequestConfig>,
    ) -> Result<Value, QueryError> {
        let request = HttpRequest {
            method,
            url: self.url_for(url),
            body,
            config: config.cloned(),
        };
        let target = request.url.clone();

        let response = self.inner.transport.send(request).await.inspect_err(|e| {
            debug!(%method, url = %target, error = %e, "request failed");
        })?;

        if response.is_success() {
            Ok(response.data)
        } else {
            debug!(%method, url = %target, status = response.status, "request returned error status");
            Err(QueryError::Status {
                status: response.status,
                body: response.data.to_string(),
            })
        }
    }

    /// Issues a GET and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`]; payloads that do not decode as `T` yield
    /// [`QueryError::Decode`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        config: Option<&RequestConfig>,
    ) -> Result<T, QueryError> {
        let data = self.request(Method::Get, url, None, config).await?;
        decode(data)
    }

    /// Issues a request with an optional JSON body and decodes the payload.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::get`]. A body that fails to serialize yields
    /// [`QueryError::Decode`] before anything is sent.
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        config: Option<&RequestConfig>,
    ) -> Result<T, QueryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| QueryError::Decode(e.to_string()))?;
        self.send(method, url, body, config).await
    }

    /// Like [`HttpClient::send_json`] with an already encoded body.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::get`].
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        config: Option<&RequestConfig>,
    ) -> Result<T, QueryError> {
        let data = self.request(method, url, body, config).await?;
        decode(data)
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, QueryError> {
    serde_json::from_value(data).map_err(|e| QueryError::Decode(e.to_string()))
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

/// One [`HttpClient`] per base URL, created on first use.
///
/// The registry is meant to be created once and shared; instances are never
/// evicted.
pub struct ClientRegistry {
    transport: Arc<dyn Transport>,
    default: HttpClient,
    instances: DashMap<String, HttpClient>,
}

impl ClientRegistry {
    /// A registry sending requests through `reqwest`.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::new())
    }

    #[must_use]
    pub fn with_transport(transport: impl Transport) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        Self {
            default: HttpClient::new(None, transport.clone()),
            transport,
            instances: DashMap::new(),
        }
    }

    /// Returns the client for `base_url`, creating it on first use.
    ///
    /// No base URL, or an empty one, yields the shared default client.
    pub fn get<'a>(&self, base_url: impl Into<Option<&'a str>>) -> HttpClient {
        let base_url = match base_url.into() {
            Some(base_url) if !base_url.is_empty() => base_url,
            _ => return self.default.clone(),
        };

        if let Some(client) = self.instances.get(base_url) {
            return client.clone();
        }

        self.instances
            .entry(base_url.to_owned())
            .or_insert_with(|| {
                debug!(base_url, "created http client");
                HttpClient::new(Some(base_url.to_owned()), self.transport.clone())
            })
            .clone()
    }

    pub fn default_client(&self) -> HttpClient {
        self.default.clone()
    }

    /// Number of base-URL-bound clients created so far.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(feature = "http")]
impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recorder::Recorder;
    use serde_json::json;

    /// Minimal in-process transport for unit tests.
    mod recorder {
        use super::*;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Recorder {
            pub requests: Mutex<Vec<HttpRequest>>,
            pub response: Mutex<Option<HttpResponse>>,
        }

        impl Transport for Arc<Recorder> {
            fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>> {
                if let Ok(mut requests) = self.requests.lock() {
                    requests.push(request);
                }
                let response = self
                    .response
                    .lock()
                    .ok()
                    .and_then(|r| r.clone())
                    .unwrap_or(HttpResponse {
                        status: 200,
                        data: Value::Null,
                    });
                Box::pin(async move { Ok(response) })
            }
        }
    }

    #[test]
    fn test_combine_urls() {
        assert_eq!(combine_urls(Some("https://a.com/"), "/posts"), "https://a.com/posts");
        assert_eq!(combine_urls(Some("https://a.com"), "posts/1"), "https://a.com/posts/1");
        assert_eq!(combine_urls(Some("https://a.com/"), ""), "https://a.com");
        assert_eq!(combine_urls(Some("https://a.com"), "https://b.com/x"), "https://b.com/x");
        assert_eq!(combine_urls(Some("https://a.com"), "//cdn.com/x"), "//cdn.com/x");
        assert_eq!(combine_urls(None, "posts"), "posts");
        assert_eq!(combine_urls(Some(""), "posts"), "posts");
        assert_eq!(combine_urls(Some("https://a.com"), "posts?next=http://x"), "https://a.com/posts?next=http://x");
    }

    #[test]
    fn test_registry_reuses_instances() {
        let registry = ClientRegistry::with_transport(Arc::new(Recorder::default()));

        let a1 = registry.get("https://a");
        let a2 = registry.get("https://a");
        let b = registry.get("https://b");

        assert!(a1.ptr_eq(&a2));
        assert!(!a1.ptr_eq(&b));
        assert_eq!(a1.base_url(), Some("https://a"));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registry_concurrent_get_creates_one_client() {
        let registry = Arc::new(ClientRegistry::with_transport(Arc::new(Recorder::default())));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get("https://a") })
            })
            .collect();

        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.expect("task should not panic"));
        }

        assert!(clients.iter().all(|c| c.ptr_eq(&clients[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_default_client() {
        let registry = ClientRegistry::with_transport(Arc::new(Recorder::default()));

        let d1 = registry.get(None);
        let d2 = registry.get("");
        assert!(d1.ptr_eq(&d2));
        assert!(d1.ptr_eq(&registry.default_client()));
        assert_eq!(d1.base_url(), None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_request_joins_url_and_passes_config() {
        let recorder = Arc::new(Recorder::default());
        let registry = ClientRegistry::with_transport(recorder.clone());
        let config = RequestConfig::new().with_header("A", "1");

        let _: Value = registry
            .get("https://a.com")
            .send_json(Method::Post, "posts", Some(&json!({ "title": "t" })), Some(&config))
            .await
            .expect("recorder answers 200");

        let requests = recorder.requests.lock().expect("lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://a.com/posts");
        assert_eq!(requests[0].body, Some(json!({ "title": "t" })));
        assert_eq!(requests[0].config, Some(config.clone()));
    }

    #[tokio::test]
    async fn test_error_status_is_query_error() {
        let recorder = Arc::new(Recorder::default());
        if let Ok(mut response) = recorder.response.lock() {
            *response = Some(HttpResponse {
                status: 404,
                data: json!({ "message": "missing" }),
            });
        }
        let registry = ClientRegistry::with_transport(recorder);

        let err = registry
            .get("https://a.com")
            .get::<Value>("posts/9", None)
            .await
            .expect_err("404 is an error");
        assert!(matches!(err, QueryError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_decode_failure() {
        let recorder = Arc::new(Recorder::default());
        if let Ok(mut response) = recorder.response.lock() {
            *response = Some(HttpResponse {
                status: 200,
                data: json!("not a number"),
            });
        }
        let registry = ClientRegistry::with_transport(recorder);

        let err = registry
            .get(None)
            .get::<u32>("https://a.com/count", None)
            .await
            .expect_err("string is not u32");
        assert!(matches!(err, QueryError::Decode(_)));
    }
}
