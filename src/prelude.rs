//! Prelude module for convenient imports.
//!
//! ```
//! use rest_queries::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Command`] and [`Subscription`]
//! - The endpoint configuration types, starting with [`ConfigTree`]
//! - The query and mutation primitives, starting with [`Query`]
//! - [`QueriesProvider`] and [`Endpoints`]

pub use crate::command::Command;
pub use crate::endpoints::{
    BaseEntry, ConfigError, ConfigPatch, ConfigTree, QueryDescriptor, RequestConfig, RequestConfigAction,
    UrlEntry, UrlParams, UrlSettings, parse_config_url, parse_url,
};
pub use crate::provider::{Endpoints, QueriesProvider};
pub use crate::subscription::Subscription;
pub use crate::subscription::http::{
    ClientRegistry, InfiniteData, InfiniteQuery, Mutation, MutationResult, MutationState, PageParam, Query,
    QueryClient, QueryConfig, QueryError, QueryResult, QueryState, RestMutation,
};
