//! # rest-queries - declarative REST endpoints with cached queries
//!
//! Describe REST endpoints once, as named and templated URLs grouped under
//! base URLs, then read and write them through typed query and mutation
//! primitives. Endpoint configuration can be changed at runtime; every change
//! is committed as a new snapshot and announced to subscribers.
//!
//! ## Core Components
//!
//! - [`endpoints`]: the configuration tree, its resolution and mutation rules,
//!   and isolated configuration scopes
//! - [`subscription::http`]: cached queries, paginated queries, mutations and
//!   the per-base-URL client registry
//! - [`Command`](command::Command): one-shot async side effects
//! - [`Subscription`](subscription::Subscription): long-lived event sources
//! - [`QueriesProvider`](provider::QueriesProvider): wires the pieces together
//!
//! ## Example
//!
//! ```rust
//! use rest_queries::prelude::*;
//!
//! let provider = QueriesProvider::new();
//! let endpoints = provider.mount(
//!     None,
//!     ConfigTree::new().with_base(
//!         "jsonPlaceholder",
//!         BaseEntry::new("https://jsonplaceholder.typicode.com")
//!             .with_request_config(RequestConfig::new().with_header("Accept", "application/json"))
//!             .with_leaf("posts", "posts")
//!             .with_leaf("post", "posts/{{id}}"),
//!     ),
//! );
//!
//! let descriptor = endpoints
//!     .query_config("jsonPlaceholder", Some("post"))?
//!     .with_params([("id", 1)]);
//! let post = Subscription::new(endpoints.get::<serde_json::Value>(&"post-1", descriptor));
//! # let _ = post;
//! # Ok::<(), rest_queries::endpoints::ConfigError>(())
//! ```
//!
//! ## Logging
//!
//! Diagnostics are emitted through [`tracing`]. Rejected configuration
//! updates are logged at `error` level; the crate never installs a
//! subscriber.

pub mod command;
pub mod endpoints;
pub mod prelude;
pub mod provider;
pub mod subscription;

pub use command::Command;
