//! HTTP query and mutation support with caching.
//!
//! Subscription-based reads and command-based writes against endpoints
//! resolved from a [`ConfigTree`](crate::endpoints::ConfigTree).
//!
//! # Features
//!
//! - **Queries**: [`Query`] and [`InfiniteQuery`] fetch, cache and refetch data
//! - **Mutations**: [`Mutation`] and [`RestMutation`] run POST, PUT, PATCH and DELETE
//! - **Clients**: [`ClientRegistry`] keeps one [`HttpClient`] per base URL
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_queries::subscription::http::{ClientRegistry, Query, QueryClient};
//! use std::sync::Arc;
//!
//! let clients = ClientRegistry::new();
//! let query_client = Arc::new(QueryClient::new());
//!
//! let posts = Query::<Vec<Post>>::get(&"posts", descriptor, &clients, query_client.clone());
//! ```

mod cache;
pub mod client;
mod config;
pub mod infinite;
pub mod mutation;
pub mod query;

// Re-export main types
#[cfg(feature = "http")]
pub use client::ReqwestTransport;
pub use client::{ClientRegistry, HttpClient, HttpRequest, HttpResponse, Method, Transport, combine_urls};
pub use config::QueryConfig;
pub use infinite::{InfiniteData, InfiniteQuery, PageParam, next_page_param};
pub use mutation::{Mutation, MutationResult, MutationState, RestMutation};
pub use query::{Query, QueryClient, QueryError, QueryEvent, QueryResult, QueryState};
