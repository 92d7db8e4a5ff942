//! Application-level wiring.
//!
//! A [`QueriesProvider`] owns the process-wide services: configuration scopes,
//! HTTP clients and the query cache. It is created once at startup and passed
//! to whatever needs it. [`Endpoints`] is a cheap, cloneable view onto one
//! scope that builds queries and mutations from endpoint names.
//!
//! ```rust
//! use rest_queries::endpoints::{BaseEntry, ConfigTree};
//! use rest_queries::provider::QueriesProvider;
//!
//! let provider = QueriesProvider::new();
//! let endpoints = provider.mount(
//!     None,
//!     ConfigTree::new().with_base(
//!         "jsonPlaceholder",
//!         BaseEntry::new("https://jsonplaceholder.typicode.com").with_leaf("post", "posts/{{id}}"),
//!     ),
//! );
//!
//! let descriptor = endpoints.query_config("jsonPlaceholder", Some("post"))?;
//! assert_eq!(descriptor.with_params([("id", 3)]).url, "posts/3");
//! # Ok::<(), rest_queries::endpoints::ConfigError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Command;
use crate::endpoints::{
    ConfigChanges, ConfigError, ConfigHandle, ConfigTree, LeafKeys, MutationReport, QueryDescriptor,
    Resolution, ScopeRegistry, Updates,
};
use crate::subscription::http::{
    ClientRegistry, InfiniteQuery, PageParam, Query, QueryClient, QueryConfig, RestMutation, Transport,
};

/// Owner of configuration scopes, HTTP clients and the query cache.
pub struct QueriesProvider {
    scopes: ScopeRegistry,
    clients: Arc<ClientRegistry>,
    query_client: Arc<QueryClient>,
}

impl QueriesProvider {
    /// A provider sending requests through `reqwest`.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn new() -> Self {
        Self::from_clients(ClientRegistry::new())
    }

    /// A provider sending requests through `transport`.
    #[must_use]
    pub fn with_transport(transport: impl Transport) -> Self {
        Self::from_clients(ClientRegistry::with_transport(transport))
    }

    fn from_clients(clients: ClientRegistry) -> Self {
        Self {
            scopes: ScopeRegistry::new(),
            clients: Arc::new(clients),
            query_client: Arc::new(QueryClient::new()),
        }
    }

    /// Replaces the query cache with an empty one using `config`.
    #[must_use]
    pub fn with_query_config(mut self, config: QueryConfig) -> Self {
        self.query_client = Arc::new(QueryClient::with_config(config));
        self
    }

    /// Installs `tree` for `context_id` (the default scope when `None`).
    ///
    /// Mounting an existing scope again replaces its tree wholesale and
    /// notifies its subscribers.
    pub fn mount(&self, context_id: Option<&str>, tree: ConfigTree) -> Endpoints {
        self.bind(self.scopes.mount(context_id, tree))
    }

    /// Endpoints of an existing scope, or of a new empty one.
    pub fn endpoints(&self, context_id: Option<&str>) -> Endpoints {
        self.bind(self.scopes.scope(context_id))
    }

    fn bind(&self, config: ConfigHandle) -> Endpoints {
        Endpoints {
            config,
            clients: self.clients.clone(),
            query_client: self.query_client.clone(),
        }
    }

    pub const fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    pub const fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub const fn query_client(&self) -> &Arc<QueryClient> {
        &self.query_client
    }
}

#[cfg(feature = "http")]
impl Default for QueriesProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueriesProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueriesProvider")
            .field("scopes", &self.scopes)
            .field("clients", &self.clients)
            .field("query_client", &self.query_client)
            .finish()
    }
}

/// Queries and mutations for the endpoints of one scope.
#[derive(Clone)]
pub struct Endpoints {
    config: ConfigHandle,
    clients: Arc<ClientRegistry>,
    query_client: Arc<QueryClient>,
}

impl Endpoints {
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub const fn query_client(&self) -> &Arc<QueryClient> {
        &self.query_client
    }

    pub const fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// The resolved descriptor of `base` or one of its leaves.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn query_config(&self, base: &str, leaf: Option<&str>) -> Result<QueryDescriptor, ConfigError> {
        self.config.query_config(base, leaf)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve(&self, base: &str, leaves: impl Into<LeafKeys>) -> Result<Resolution, ConfigError> {
        self.config.resolve(base, leaves)
    }

    /// Updates the scope's tree. See [`ConfigHandle::update`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] or [`ConfigError::ShapeMismatch`];
    /// per-target rejections are reported in the [`MutationReport`].
    pub fn set_query_config(
        &self,
        base: &str,
        leaves: impl Into<LeafKeys>,
        updates: impl Into<Updates>,
    ) -> Result<MutationReport, ConfigError> {
        self.config.update(base, leaves, updates)
    }

    /// Configuration changes of this scope.
    pub fn subscribe(&self) -> ConfigChanges {
        self.config.subscribe()
    }

    /// A cached GET of `descriptor` under `key`.
    pub fn get<V>(&self, key: &impl ToString, descriptor: QueryDescriptor) -> Query<V>
    where
        V: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Query::get(key, descriptor, &self.clients, self.query_client.clone())
    }

    /// A paginated GET of `descriptor` under `key`.
    pub fn infinite_get<T>(
        &self,
        key: &impl ToString,
        descriptor: QueryDescriptor,
        initial_page: impl Into<PageParam>,
        page_size: usize,
    ) -> InfiniteQuery<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        InfiniteQuery::get(
            key,
            descriptor,
            initial_page,
            page_size,
            &self.clients,
            self.query_client.clone(),
        )
    }

    /// A POST of `descriptor`.
    ///
    /// Independent writes can be sent together with [`Command::batch`]:
    ///
    /// ```rust
    /// use rest_queries::prelude::*;
    /// use serde_json::{Value, json};
    ///
    /// enum Message {
    ///     Saved(Result<Value, QueryError>),
    /// }
    ///
    /// let provider = QueriesProvider::new();
    /// let endpoints = provider.mount(
    ///     None,
    ///     ConfigTree::new().with_base("api", BaseEntry::new("https://api.test").with_leaf("posts", "posts")),
    /// );
    /// let posts = endpoints.query_config("api", Some("posts"))?;
    ///
    /// let cmd = Command::batch([
    ///     endpoints.post::<Value, Value>(posts.clone()).mutate(json!({ "title": "a" })).map(Message::Saved),
    ///     endpoints.post::<Value, Value>(posts).mutate(json!({ "title": "b" })).map(Message::Saved),
    /// ]);
    /// assert!(!cmd.is_none());
    /// # Ok::<(), ConfigError>(())
    /// ```
    pub fn post<I, O>(&self, descriptor: QueryDescriptor) -> RestMutation<I, O>
    where
        I: Serialize + Send + 'static,
        O: DeserializeOwned + Send + 'static,
    {
        RestMutation::post(descriptor, &self.clients)
    }

    pub fn put<I, O>(&self, descriptor: QueryDescriptor) -> RestMutation<I, O>
    where
        I: Serialize + Send + 'static,
        O: DeserializeOwned + Send + 'static,
    {
        RestMutation::put(descriptor, &self.clients)
    }

    pub fn patch<I, O>(&self, descriptor: QueryDescriptor) -> RestMutation<I, O>
    where
        I: Serialize + Send + 'static,
        O: DeserializeOwned + Send + 'static,
    {
        RestMutation::patch(descriptor, &self.clients)
    }

    pub fn delete<O>(&self, descriptor: QueryDescriptor) -> RestMutation<(), O>
    where
        O: DeserializeOwned + Send + 'static,
    {
        RestMutation::delete(descriptor, &self.clients)
    }

    pub fn invalidate<Msg: Send + 'static>(&self, key: &impl ToString) -> Command<Msg> {
        self.query_client.invalidate(key)
    }

    pub fn invalidate_many<Msg, K>(&self, keys: impl IntoIterator<Item = K>) -> Command<Msg>
    where
        Msg: Send + 'static,
        K: ToString,
    {
        self.query_client.invalidate_many(keys)
    }

    pub fn fetch_next_page<Msg: Send + 'static>(&self, key: &impl ToString) -> Command<Msg> {
        self.query_client.fetch_next_page(key)
    }
}

impl fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoints")
            .field("context_id", &self.config.context_id())
            .field("version", &self.config.version())
            .finish_non_exhaustive()
    }
}
