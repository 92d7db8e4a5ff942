//! Cached HTTP reads.
//!
//! A [`Query`] is a subscription rather than a single request. While it is
//! being polled it keeps the cached value for its key in sync:
//!
//! 1. Cached data is emitted right away
//! 2. Missing or stale data triggers a fetch
//! 3. Invalidating the key through [`QueryClient`] refetches it
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_queries::prelude::*;
//!
//! let descriptor = endpoints.query_config("jsonPlaceholder", Some("post"))?
//!     .with_params([("id", 1)]);
//!
//! let sub = Subscription::new(Query::<Post>::get(
//!     &"post-1",
//!     descriptor,
//!     &clients,
//!     query_client.clone(),
//! ))
//! .map(Message::PostQuery);
//!
//! // later, after a successful write
//! query_client.invalidate::<Message>(&"post-1");
//! ```

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::Command;
use crate::endpoints::QueryDescriptor;
use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::cache::{AnyEntry, CacheEntry};
use super::client::ClientRegistry;
use super::config::QueryConfig;

/// Error type for query operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Fetch failed: {0}")]
    FetchError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response payload: {0}")]
    Decode(String),
}

/// The state of a query result.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// Query is loading (fetching data).
    Loading,
    /// Query succeeded with data.
    Success {
        /// The data returned by the query.
        data: T,
        /// Whether the data is stale and should be refetched.
        is_stale: bool,
    },
    /// Query failed with an error.
    Error(QueryError),
}

/// A query result containing the current state.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    /// The current state of the query.
    pub state: QueryState<T>,
}

impl<T> QueryResult<T> {
    pub(crate) const fn loading() -> Self {
        Self {
            state: QueryState::Loading,
        }
    }

    pub(crate) const fn success(data: T, is_stale: bool) -> Self {
        Self {
            state: QueryState::Success { data, is_stale },
        }
    }

    pub(crate) const fn error(error: QueryError) -> Self {
        Self {
            state: QueryState::Error(error),
        }
    }

    /// Returns the data if the query succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the query failed, otherwise `None`.
    pub const fn error_value(&self) -> Option<&QueryError> {
        match &self.state {
            QueryState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the query is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, QueryState::Loading)
    }

    /// Returns `true` if the query succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, QueryState::Success { .. })
    }

    /// Returns `true` if the query failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, QueryState::Error(_))
    }

    /// Returns `true` if the query data is stale.
    pub const fn is_stale(&self) -> bool {
        matches!(self.state, QueryState::Success { is_stale: true, .. })
    }
}

/// Notification sent from a [`QueryClient`] to the queries it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// The cached value for this key is outdated.
    Invalidated(String),
    /// A paginated query for this key should load its next page.
    FetchNextPage(String),
}

impl QueryEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Invalidated(key) | Self::FetchNextPage(key) => key,
        }
    }
}

/// The query cache and its event channel.
///
/// Cloning shares the cache. Every query subscription holds an
/// `Arc<QueryClient>`; invalidations reach all of them through a broadcast
/// channel.
///
/// # Example
///
/// ```rust
/// use rest_queries::subscription::http::{QueryClient, QueryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = QueryConfig::new(
///     Duration::from_secs(30),  // stale_time
///     Duration::from_secs(300), // cache_time
/// );
///
/// let client = Arc::new(QueryClient::with_config(config));
/// assert!(client.is_empty());
/// ```
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<DashMap<String, Box<dyn AnyEntry>>>,
    events: broadcast::Sender<QueryEvent>,
    config: QueryConfig,
}

impl QueryClient {
    /// Creates a new query client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a new query client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            cache: Arc::new(DashMap::new()),
            events,
            config,
        }
    }

    /// Marks the cached value for `key` stale and tells active queries to
    /// refetch it.
    ///
    /// The work happens when the returned command is driven; it produces no
    /// messages.
    pub fn invalidate<Msg>(&self, key: &impl ToString) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        self.invalidate_many([key.to_string()])
    }

    /// [`QueryClient::invalidate`] for several keys at once.
    pub fn invalidate_many<Msg, K>(&self, keys: impl IntoIterator<Item = K>) -> Command<Msg>
    where
        Msg: Send + 'static,
        K: ToString,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.to_string()).collect();
        let cache = self.cache.clone();
        let tx = self.events.clone();

        Command::effect(async move {
            for key in keys {
                if let Some(mut entry) = cache.get_mut(&key) {
                    entry.mark_stale();
                }
                trace!(key = %key, "invalidated query");
                // No receivers just means no query is active for now
                let _ = tx.send(QueryEvent::Invalidated(key));
            }
        })
    }

    /// Asks an active paginated query for `key` to load its next page.
    pub fn fetch_next_page<Msg>(&self, key: &impl ToString) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        let key = key.to_string();
        let tx = self.events.clone();

        Command::effect(async move {
            let _ = tx.send(QueryEvent::FetchNextPage(key));
        })
    }

    /// Drops cache entries older than the configured cache time and returns
    /// how many were removed.
    pub fn collect_garbage(&self) -> usize {
        let before = self.cache.len();
        let cache_time = self.config.cache_time;
        self.cache.retain(|_, entry| !entry.should_gc(cache_time));
        before.saturating_sub(self.cache.len())
    }

    /// Removes the cached value for `key`. Returns `true` if there was one.
    pub fn remove(&self, key: &str) -> bool {
        self.cache.remove(key).is_some()
    }

    /// Returns the cached data for `key` if it holds a `T`.
    pub fn cached_data<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.get_cache::<T>(key).map(|entry| entry.data)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn get_cache<T: Clone + Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Option<CacheEntry<T>> {
        self.cache.get(key).and_then(|entry| {
            entry
                .as_any()
                .downcast_ref::<CacheEntry<T>>()
                .cloned()
        })
    }

    pub(crate) fn set_cache<T: Clone + Send + Sync + 'static>(&self, key: String, entry: CacheEntry<T>) {
        self.cache.insert(key, Box::new(entry));
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;

/// A query subscription that monitors and fetches data with caching.
///
/// When subscribed:
///
/// 1. If cached data exists, it's immediately emitted as `Success`
/// 2. If data is missing or stale, a fetch is triggered and `Loading` is emitted
/// 3. When invalidated, the query refetches, emitting the stale value (or
///    `Loading` when nothing is cached) first
pub struct Query<V> {
    key: String,
    fetcher: Fetcher<V>,
    client: Arc<QueryClient>,
}

impl<V> Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new query with the given key, fetcher, and client.
    ///
    /// # Arguments
    ///
    /// * `key` - A unique identifier for this query (used for caching)
    /// * `fetcher` - An async function that fetches the data
    /// * `client` - The query client for cache management
    pub fn new<F>(key: &impl ToString, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key: key.to_string(),
            fetcher: Arc::new(fetcher),
            client,
        }
    }

    /// A query issuing `GET descriptor.url` through the client registered for
    /// `descriptor.base_url`, with the descriptor's request config.
    ///
    /// Placeholders in the URL must already be substituted.
    pub fn get(
        key: &impl ToString,
        descriptor: QueryDescriptor,
        clients: &ClientRegistry,
        client: Arc<QueryClient>,
    ) -> Self
    where
        V: DeserializeOwned,
    {
        let http = clients.get(descriptor.base_url.as_str());
        let descriptor = Arc::new(descriptor);

        Self::new(
            key,
            move || {
                let http = http.clone();
                let descriptor = descriptor.clone();
                Box::pin(async move {
                    http.get::<V>(&descriptor.url, descriptor.request_config.as_ref())
                        .await
                })
            },
            client,
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<V> SubscriptionSource for Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = QueryResult<V>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let key: Arc<str> = Arc::from(self.key.as_str());
        let fetcher = self.fetcher.clone();
        let client = self.client.clone();
        // Subscribe up front so invalidations sent during the first fetch are
        // not missed
        let rx = client.subscribe_events();

        stream::unfold(State::Initial { rx }, move |state| {
            let key = key.clone();
            let fetcher = fetcher.clone();
            let client = client.clone();

            async move {
                match state {
                    State::Initial { rx } => {
                        if let Some(mut cached) = client.get_cache::<V>(&key) {
                            let is_stale = cached.check_staleness(client.config().stale_time);
                            let result = QueryResult::success(cached.data, is_stale);

                            if is_stale {
                                // Stale data: emit it, then refetch
                                Some((result, State::Fetching { rx }))
                            } else {
                                Some((result, State::Watching { rx }))
                            }
                        } else {
                            Some((QueryResult::loading(), State::Fetching { rx }))
                        }
                    }

                    State::Fetching { rx } => {
                        let result = match fetcher().await {
                            Ok(data) => {
                                client.set_cache(key.to_string(), CacheEntry::new(data.clone()));
                                QueryResult::success(data, false)
                            }
                            Err(e) => {
                                warn!(key = %key, error = %e, "query fetch failed");
                                QueryResult::error(e)
                            }
                        };

                        // Errors also wait for an invalidation to retry
                        Some((result, State::Watching { rx }))
                    }

                    State::Watching { mut rx } => loop {
                        match rx.recv().await {
                            Ok(QueryEvent::Invalidated(invalidated)) if *invalidated == *key => {
                                let result = match client.get_cache::<V>(&key) {
                                    Some(cached) => QueryResult::success(cached.data, true),
                                    None => QueryResult::loading(),
                                };
                                return Some((result, State::Fetching { rx }));
                            }
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    },
                }
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<V> Hash for Query<V> {
    fn hash<H>(&self, hasher: &mut H)
    where
        H: std::hash::Hasher,
    {
        self.key.hash(hasher);
    }
}

/// Internal state machine for the Query subscription.
enum State {
    Initial { rx: broadcast::Receiver<QueryEvent> },
    Fetching { rx: broadcast::Receiver<QueryEvent> },
    Watching { rx: broadcast::Receiver<QueryEvent> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn counting_query(
        key: &str,
        client: Arc<QueryClient>,
    ) -> (Query<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let query = Query::new(
            &key,
            move || {
                let counter = counter.clone();
                Box::pin(async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) })
            },
            client,
        );
        (query, calls)
    }

    #[test]
    fn test_query_result_data() {
        let result = QueryResult::success(42, false);
        assert_eq!(result.data(), Some(&42));

        let result: QueryResult<i32> = QueryResult::loading();
        assert_eq!(result.data(), None);

        let result: QueryResult<i32> = QueryResult::error(QueryError::FetchError("error".to_string()));
        assert_eq!(result.data(), None);
        assert_eq!(
            result.error_value(),
            Some(&QueryError::FetchError("error".to_string()))
        );
    }

    #[test]
    fn test_query_result_predicates() {
        let loading: QueryResult<i32> = QueryResult::loading();
        assert!(loading.is_loading());
        assert!(!loading.is_success());
        assert!(!loading.is_error());
        assert!(!loading.is_stale());

        let success = QueryResult::success(42, false);
        assert!(!success.is_loading());
        assert!(success.is_success());
        assert!(!success.is_error());
        assert!(!success.is_stale());

        let stale = QueryResult::success(42, true);
        assert!(stale.is_success());
        assert!(stale.is_stale());

        let error: QueryResult<i32> = QueryResult::error(QueryError::NetworkError("down".to_string()));
        assert!(!error.is_loading());
        assert!(!error.is_success());
        assert!(error.is_error());
        assert!(!error.is_stale());
    }

    #[test]
    fn test_query_client_with_config() {
        let config = QueryConfig::new(Duration::from_secs(30), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        assert_eq!(client.config().stale_time, Duration::from_secs(30));
        assert_eq!(client.config().cache_time, Duration::from_secs(300));
        assert!(client.is_empty());
    }

    #[test]
    fn test_query_client_cache_operations() {
        let client = QueryClient::new();
        assert!(client.get_cache::<i32>("key1").is_none());

        client.set_cache("key1".to_string(), CacheEntry::new(42));
        assert_eq!(client.cached_data::<i32>("key1"), Some(42));

        // Wrong type reads as absent
        assert_eq!(client.cached_data::<String>("key1"), None);

        assert!(client.remove("key1"));
        assert!(!client.remove("key1"));
    }

    #[test]
    fn test_collect_garbage() {
        let client = QueryClient::with_config(QueryConfig::new(
            Duration::from_secs(0),
            Duration::from_millis(5),
        ));
        client.set_cache("old".to_string(), CacheEntry::new(1));
        std::thread::sleep(Duration::from_millis(10));
        client.set_cache("new".to_string(), CacheEntry::new(2));

        assert_eq!(client.collect_garbage(), 1);
        assert_eq!(client.cached_data::<i32>("new"), Some(2));
        assert_eq!(client.cached_data::<i32>("old"), None);
    }

    #[test]
    fn test_query_error_display() {
        let err = QueryError::FetchError("test error".to_string());
        assert_eq!(err.to_string(), "Fetch failed: test error");

        let err = QueryError::NetworkError("network error".to_string());
        assert_eq!(err.to_string(), "Network error: network error");

        let err = QueryError::Status {
            status: 404,
            body: "\"missing\"".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed with status 404: \"missing\"");
    }

    #[tokio::test]
    async fn test_invalidate_command_produces_no_messages() {
        let client = QueryClient::new();
        let cmd: Command<()> = client.invalidate(&"test-key");
        assert!(cmd.run().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_broadcasts_and_marks_stale() {
        let client = QueryClient::new();
        client.set_cache("test-key".to_string(), CacheEntry::new(1));
        let mut rx = client.subscribe_events();

        client.invalidate::<()>(&"test-key").run().await;

        let event = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Should receive notification within timeout")
            .expect("Channel should not be closed");
        assert_eq!(event, QueryEvent::Invalidated("test-key".to_string()));

        let entry = client.get_cache::<i32>("test-key").expect("entry kept");
        assert!(entry.is_stale);
    }

    #[tokio::test]
    async fn test_invalidate_many_in_order() {
        let client = QueryClient::new();
        let mut rx = client.subscribe_events();

        client.invalidate_many::<(), _>(["a", "b"]).run().await;

        assert_eq!(rx.recv().await.expect("first").key(), "a");
        assert_eq!(rx.recv().await.expect("second").key(), "b");
    }

    #[tokio::test]
    async fn test_fetch_next_page_event() {
        let client = QueryClient::new();
        let mut rx = client.subscribe_events();

        client.fetch_next_page::<()>(&"feed").run().await;

        assert_eq!(
            rx.recv().await.expect("event"),
            QueryEvent::FetchNextPage("feed".to_string())
        );
    }

    #[tokio::test]
    async fn test_query_fetches_then_caches() {
        let client = Arc::new(QueryClient::new());
        let (query, calls) = counting_query("count", client.clone());

        let results: Vec<_> = query.stream().take(2).collect().await;
        assert!(results[0].is_loading());
        assert_eq!(results[1].data(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.cached_data::<usize>("count"), Some(1));
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let client = Arc::new(QueryClient::with_config(
            QueryConfig::default().with_stale_time(Duration::from_secs(60)),
        ));
        client.set_cache("count".to_string(), CacheEntry::new(7_usize));
        let (query, calls) = counting_query("count", client);

        let mut stream = query.stream();
        let first = stream.next().await.expect("cached value");
        assert_eq!(first.data(), Some(&7));
        assert!(!first.is_stale());

        // Nothing else happens until invalidation
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_emits_then_refetches() {
        let client = Arc::new(QueryClient::new());
        client.set_cache("count".to_string(), CacheEntry::new(7_usize));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (query, _) = counting_query("count", client);

        let results: Vec<_> = query.stream().take(2).collect().await;
        assert_eq!(results[0].data(), Some(&7));
        assert!(results[0].is_stale());
        assert_eq!(results[1].data(), Some(&1));
        assert!(!results[1].is_stale());
    }

    #[tokio::test]
    async fn test_invalidation_refetches_active_query() {
        let client = Arc::new(QueryClient::new());
        let (query, calls) = counting_query("count", client.clone());

        let mut stream = query.stream();
        assert!(stream.next().await.expect("loading").is_loading());
        assert_eq!(stream.next().await.expect("first").data(), Some(&1));

        client.invalidate::<()>(&"other").run().await;
        client.invalidate::<()>(&"count").run().await;

        let stale = stream.next().await.expect("stale value");
        assert_eq!(stale.data(), Some(&1));
        assert!(stale.is_stale());
        assert_eq!(stream.next().await.expect("refetched").data(), Some(&2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_error_is_reported() {
        let client = Arc::new(QueryClient::new());
        let query: Query<i32> = Query::new(
            &"broken",
            || Box::pin(async { Err(QueryError::NetworkError("refused".to_string())) }),
            client,
        );

        let results: Vec<_> = query.stream().take(2).collect().await;
        assert!(results[0].is_loading());
        assert_eq!(
            results[1].error_value(),
            Some(&QueryError::NetworkError("refused".to_string()))
        );
        assert!(logs_contain("query fetch failed"));
    }

    #[test]
    fn test_query_id_consistency() {
        let client = Arc::new(QueryClient::new());
        let (query1, _) = counting_query("user-123", client.clone());
        let (query2, _) = counting_query("user-123", client);
        assert_eq!(query1.id(), query2.id());
    }

    #[test]
    fn test_query_id_different_keys() {
        let client = Arc::new(QueryClient::new());
        let (query1, _) = counting_query("user-123", client.clone());
        let (query2, _) = counting_query("user-456", client);
        assert_ne!(query1.id(), query2.id());
    }

    #[test]
    fn test_query_id_same_key_different_type() {
        let client = Arc::new(QueryClient::new());
        let query1 = Query::new(
            &"data",
            || Box::pin(async { Ok::<i32, QueryError>(42) }),
            client.clone(),
        );
        let query2 = Query::new(
            &"data",
            || Box::pin(async { Ok::<String, QueryError>("test".to_string()) }),
            client,
        );

        // SubscriptionId::of::<Self> includes the value type
        assert_ne!(query1.id(), query2.id());
    }
}
