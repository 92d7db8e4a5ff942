//! Declarative endpoint configuration.
//!
//! Endpoints are described once as a [`ConfigTree`]: named *base groups*, each
//! bound to a `baseURL` and an optional request config, holding named *leaves*
//! whose URLs are templates such as `posts/{{id}}`.
//!
//! ```rust
//! use rest_queries::endpoints::{BaseEntry, ConfigTree, RequestConfig};
//!
//! let tree = ConfigTree::new().with_base(
//!     "jsonplaceholder",
//!     BaseEntry::new("https://jsonplaceholder.typicode.com")
//!         .with_request_config(RequestConfig::new().with_header("Accept", "application/json"))
//!         .with_leaf("fakePosts", "posts")
//!         .with_leaf("fakePost", "posts/{{id}}"),
//! );
//!
//! let descriptor = tree.resolve_leaf("jsonplaceholder", "fakePost")?;
//! assert_eq!(descriptor.url, "posts/{{id}}");
//! assert_eq!(descriptor.with_params([("id", 1)]).url, "posts/1");
//! # Ok::<(), rest_queries::endpoints::ConfigError>(())
//! ```
//!
//! Reading goes through [`ConfigTree::resolve`] and friends, writing through
//! [`ConfigTree::apply`]. At runtime the tree lives inside a [`ConfigHandle`],
//! which publishes a new snapshot for every committed change.

mod merge;
mod mutate;
mod resolve;
mod store;
mod template;
mod tree;

use thiserror::Error;

pub use merge::{deep_merge, merge_request_configs};
pub use mutate::{ConfigPatch, MutationReport, Updates};
pub use resolve::{LeafKeys, Resolution};
pub use store::{ConfigChanges, ConfigHandle, DEFAULT_CONTEXT_ID, ScopeRegistry, Snapshot};
pub use template::{UrlParams, parse_config_url, parse_url};
pub use tree::{
    BaseEntry, BaseSettings, ConfigTree, QueryDescriptor, RequestConfig, RequestConfigAction,
    UrlEntry, UrlSettings,
};

/// Errors raised while reading or updating endpoint configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown base URL group `{base}`")]
    UnknownBase { base: String },

    #[error("`{leaf}` config in `{base}` is not an object to be able to update it")]
    NotMergeable { base: String, leaf: String },

    #[error("cannot apply {updates} to {leaves}")]
    ShapeMismatch { leaves: String, updates: String },

    #[error("invalid endpoint configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn unknown_base(base: &str) -> Self {
        Self::UnknownBase {
            base: base.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::unknown_base("api");
        assert_eq!(err.to_string(), "unknown base URL group `api`");

        let err = ConfigError::NotMergeable {
            base: "api".to_string(),
            leaf: "posts".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`posts` config in `api` is not an object to be able to update it"
        );
    }
}
