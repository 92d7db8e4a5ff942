use tracing::trace;

use super::ConfigError;
use super::tree::{ConfigTree, QueryDescriptor};

/// Which leaves of a base group an operation targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LeafKeys {
    /// The base group itself.
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl LeafKeys {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::None => "the base group".to_string(),
            Self::One(key) => format!("leaf `{key}`"),
            Self::Many(keys) => format!("{} leaf keys", keys.len()),
        }
    }
}

impl From<()> for LeafKeys {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<&str> for LeafKeys {
    fn from(key: &str) -> Self {
        Self::One(key.to_owned())
    }
}

impl From<String> for LeafKeys {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Option<&str>> for LeafKeys {
    fn from(key: Option<&str>) -> Self {
        key.map_or(Self::None, Self::from)
    }
}

impl From<Vec<String>> for LeafKeys {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<Vec<&str>> for LeafKeys {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for LeafKeys {
    fn from(keys: &[&str]) -> Self {
        Self::Many(keys.iter().map(|key| (*key).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for LeafKeys {
    fn from(keys: [&str; N]) -> Self {
        Self::Many(keys.iter().map(|key| (*key).to_owned()).collect())
    }
}

/// The outcome of [`ConfigTree::resolve`]: one descriptor per requested key,
/// in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    One(QueryDescriptor),
    Many(Vec<QueryDescriptor>),
}

impl Resolution {
    /// The single descriptor, or `None` for a batch.
    #[must_use]
    pub fn into_one(self) -> Option<QueryDescriptor> {
        match self {
            Self::One(descriptor) => Some(descriptor),
            Self::Many(_) => None,
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<QueryDescriptor> {
        match self {
            Self::One(descriptor) => vec![descriptor],
            Self::Many(descriptors) => descriptors,
        }
    }
}

impl ConfigTree {
    /// Resolves descriptors for a base group and zero, one or many leaves.
    ///
    /// Returned URLs are still templates; see
    /// [`QueryDescriptor::with_params`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve(&self, base: &str, leaves: impl Into<LeafKeys>) -> Result<Resolution, ConfigError> {
        match leaves.into() {
            LeafKeys::None => self.resolve_base(base).map(Resolution::One),
            LeafKeys::One(leaf) => self.resolve_leaf(base, &leaf).map(Resolution::One),
            LeafKeys::Many(leaves) => self.resolve_leaves(base, leaves).map(Resolution::Many),
        }
    }

    /// The base group's own endpoint: its `baseURL`, its top-level `url`
    /// (empty when unset) and its request config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve_base(&self, base: &str) -> Result<QueryDescriptor, ConfigError> {
        let entry = self.get(base).ok_or_else(|| ConfigError::unknown_base(base))?;
        let settings = entry.settings();

        trace!(base, "resolved base group");
        Ok(QueryDescriptor {
            base_url: settings.base_url.clone(),
            url: settings.url.clone().unwrap_or_default(),
            request_config: settings.request_config.clone(),
        })
    }

    /// Resolves one leaf, applying its `requestConfigAction`.
    ///
    /// An undeclared leaf resolves to an empty `url` with the base group's
    /// request config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve_leaf(&self, base: &str, leaf: &str) -> Result<QueryDescriptor, ConfigError> {
        let entry = self.get(base).ok_or_else(|| ConfigError::unknown_base(base))?;

        trace!(base, leaf, "resolved leaf");
        Ok(QueryDescriptor::from_leaf(entry.settings(), entry.leaf(leaf)))
    }

    /// Resolves each leaf independently, preserving the order of `leaves`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve_leaves<S: AsRef<str>>(
        &self,
        base: &str,
        leaves: impl IntoIterator<Item = S>,
    ) -> Result<Vec<QueryDescriptor>, ConfigError> {
        let entry = self.get(base).ok_or_else(|| ConfigError::unknown_base(base))?;

        Ok(leaves
            .into_iter()
            .map(|leaf| QueryDescriptor::from_leaf(entry.settings(), entry.leaf(leaf.as_ref())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{BaseEntry, RequestConfig, RequestConfigAction, UrlSettings};
    use serde_json::json;

    fn config(value: serde_json::Value) -> RequestConfig {
        serde_json::from_value(value).expect("object config")
    }

    fn tree() -> ConfigTree {
        ConfigTree::new()
            .with_base(
                "g",
                BaseEntry::new("https://g.example.com")
                    .with_request_config(config(json!({ "headers": { "A": 1 } })))
                    .with_url("health")
                    .with_leaf("c", "c/{{id}}")
                    .with_leaf(
                        "a",
                        UrlSettings::new("a").with_request_config(config(json!({ "headers": { "B": 2 } }))),
                    )
                    .with_leaf(
                        "b",
                        UrlSettings::new("b")
                            .with_request_config(config(json!({ "headers": { "B": 2 } })))
                            .with_action(RequestConfigAction::Overwrite),
                    ),
            )
            .with_base("plain", BaseEntry::new("https://plain.example.com"))
    }

    #[test]
    fn test_merge_is_default_action() {
        let descriptor = tree().resolve_leaf("g", "a").expect("declared");
        assert_eq!(descriptor.url, "a");
        assert_eq!(
            descriptor.request_config,
            Some(config(json!({ "headers": { "A": 1, "B": 2 } })))
        );
    }

    #[test]
    fn test_overwrite_ignores_base_config() {
        let descriptor = tree().resolve_leaf("g", "b").expect("declared");
        assert_eq!(descriptor.request_config, Some(config(json!({ "headers": { "B": 2 } }))));
    }

    #[test]
    fn test_string_leaf_inherits_base_config() {
        let descriptor = tree().resolve_leaf("g", "c").expect("declared");
        assert_eq!(descriptor.base_url, "https://g.example.com");
        assert_eq!(descriptor.url, "c/{{id}}");
        assert_eq!(descriptor.request_config, Some(config(json!({ "headers": { "A": 1 } }))));
    }

    #[test]
    fn test_missing_leaf_falls_back_to_base_config() {
        let descriptor = tree().resolve_leaf("g", "missing").expect("base declared");
        assert_eq!(descriptor.url, "");
        assert_eq!(descriptor.request_config, Some(config(json!({ "headers": { "A": 1 } }))));
    }

    #[test]
    fn test_resolve_without_leaf_uses_group_default() {
        let tree = tree();

        let descriptor = tree.resolve("g", ()).expect("declared").into_one().expect("single");
        assert_eq!(descriptor.url, "health");

        let plain = tree.resolve_base("plain").expect("declared");
        assert_eq!(plain.base_url, "https://plain.example.com");
        assert_eq!(plain.url, "");
        assert_eq!(plain.request_config, None);
    }

    #[test]
    fn test_batch_preserves_request_order() {
        let urls: Vec<_> = tree()
            .resolve("g", ["a", "b", "c"])
            .expect("declared")
            .into_vec()
            .into_iter()
            .map(|descriptor| descriptor.url)
            .collect();
        assert_eq!(urls, vec!["a", "b", "c/{{id}}"]);

        let urls: Vec<_> = tree()
            .resolve_leaves("g", &["c", "missing", "a"])
            .expect("declared")
            .into_iter()
            .map(|descriptor| descriptor.url)
            .collect();
        assert_eq!(urls, vec!["c/{{id}}", "", "a"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let tree = tree();
        assert_eq!(
            tree.resolve("g", vec!["a", "b"]).expect("declared"),
            tree.resolve("g", vec!["a", "b"]).expect("declared")
        );
    }

    #[test]
    fn test_unknown_base_is_error() {
        let err = tree().resolve("nope", "a").expect_err("undeclared group");
        assert_eq!(
            err,
            ConfigError::UnknownBase {
                base: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_resolution_does_not_alias_tree() {
        let tree = tree();
        let mut descriptor = tree.resolve_leaf("g", "a").expect("declared");
        if let Some(config) = descriptor.request_config.as_mut() {
            config.insert("timeout", 1);
        }

        let fresh = tree.resolve_leaf("g", "a").expect("declared");
        assert!(fresh.request_config.and_then(|c| c.timeout()).is_none());
    }
}
