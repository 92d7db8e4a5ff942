use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ConfigError;
use super::merge::merge_request_configs;
use super::template::parse_config_url;

/// Transport options attached to a base group or a leaf.
///
/// The contents are opaque to configuration resolution: they are only merged
/// or replaced wholesale. The HTTP transport reads `headers` (an object of
/// string or number values) and `timeout` (milliseconds) when it sends a
/// request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestConfig(Map<String, Value>);

impl RequestConfig {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Sets a top-level option, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Adds a header under the `headers` object, creating it when needed.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let headers = self
            .0
            .entry("headers")
            .or_insert_with(|| Value::Object(Map::new()));
        if !headers.is_object() {
            *headers = Value::Object(Map::new());
        }
        if let Value::Object(headers) = headers {
            headers.insert(name.into(), value.into());
        }
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.with("timeout", millis)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Header pairs from the `headers` object. Values that are neither strings,
    /// numbers nor booleans are skipped.
    pub fn headers(&self) -> Vec<(String, String)> {
        let Some(Value::Object(headers)) = self.0.get("headers") else {
            return Vec::new();
        };

        headers
            .iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((name.clone(), value))
            })
            .collect()
    }

    /// The `timeout` option in milliseconds. Zero means no timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.0
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }
}

impl From<Map<String, Value>> for RequestConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// How a leaf's request config combines with its base group's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestConfigAction {
    /// Deep-merge the leaf config over the base config.
    #[default]
    Merge,
    /// Use the leaf config alone.
    Overwrite,
}

/// Object form of a leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSettings {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_config: Option<RequestConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_config_action: Option<RequestConfigAction>,
}

impl UrlSettings {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_request_config(mut self, config: RequestConfig) -> Self {
        self.request_config = Some(config);
        self
    }

    #[must_use]
    pub const fn with_action(mut self, action: RequestConfigAction) -> Self {
        self.request_config_action = Some(action);
        self
    }

    /// The configured action, `MERGE` when unset.
    pub fn action(&self) -> RequestConfigAction {
        self.request_config_action.unwrap_or_default()
    }
}

/// One named endpoint inside a base group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlEntry {
    /// A bare URL template. Inherits the base group's request config verbatim.
    Template(String),
    /// A URL template with its own request config.
    Detailed(UrlSettings),
}

impl UrlEntry {
    pub fn url(&self) -> &str {
        match self {
            Self::Template(url) => url,
            Self::Detailed(settings) => &settings.url,
        }
    }
}

impl From<&str> for UrlEntry {
    fn from(url: &str) -> Self {
        Self::Template(url.to_owned())
    }
}

impl From<String> for UrlEntry {
    fn from(url: String) -> Self {
        Self::Template(url)
    }
}

impl From<UrlSettings> for UrlEntry {
    fn from(settings: UrlSettings) -> Self {
        Self::Detailed(settings)
    }
}

/// Group-level settings shared by every shape of [`BaseEntry`].
///
/// `url` is the group's own default endpoint, used when a descriptor is
/// resolved without a leaf key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseSettings {
    pub base_url: String,
    pub url: Option<String>,
    pub request_config: Option<RequestConfig>,
}

/// A named group of endpoints sharing one origin.
///
/// On the wire both shapes are a single object: `baseURL`, `url` and
/// `requestConfig` are reserved keys, every other key is a leaf. An object
/// with no leaves decodes as [`BaseEntry::Simple`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBaseEntry", into = "RawBaseEntry")]
pub enum BaseEntry {
    Simple(BaseSettings),
    Grouped {
        settings: BaseSettings,
        leaves: BTreeMap<String, UrlEntry>,
    },
}

impl BaseEntry {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::Simple(BaseSettings {
            base_url: base_url.into(),
            ..BaseSettings::default()
        })
    }

    #[must_use]
    pub fn with_request_config(mut self, config: RequestConfig) -> Self {
        self.settings_mut().request_config = Some(config);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.settings_mut().url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_leaf(mut self, key: impl Into<String>, entry: impl Into<UrlEntry>) -> Self {
        self.insert_leaf(key, entry);
        self
    }

    /// Adds or replaces a leaf, turning a simple group into a grouped one.
    pub fn insert_leaf(&mut self, key: impl Into<String>, entry: impl Into<UrlEntry>) -> Option<UrlEntry> {
        if let Self::Simple(settings) = self {
            *self = Self::Grouped {
                settings: std::mem::take(settings),
                leaves: BTreeMap::new(),
            };
        }
        match self {
            Self::Grouped { leaves, .. } => leaves.insert(key.into(), entry.into()),
            Self::Simple(_) => None,
        }
    }

    pub const fn settings(&self) -> &BaseSettings {
        match self {
            Self::Simple(settings) | Self::Grouped { settings, .. } => settings,
        }
    }

    pub fn settings_mut(&mut self) -> &mut BaseSettings {
        match self {
            Self::Simple(settings) | Self::Grouped { settings, .. } => settings,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings().base_url
    }

    pub fn leaf(&self, key: &str) -> Option<&UrlEntry> {
        match self {
            Self::Simple(_) => None,
            Self::Grouped { leaves, .. } => leaves.get(key),
        }
    }

    pub fn leaf_mut(&mut self, key: &str) -> Option<&mut UrlEntry> {
        match self {
            Self::Simple(_) => None,
            Self::Grouped { leaves, .. } => leaves.get_mut(key),
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = (&str, &UrlEntry)> {
        let leaves = match self {
            Self::Simple(_) => None,
            Self::Grouped { leaves, .. } => Some(leaves.iter()),
        };
        leaves
            .into_iter()
            .flatten()
            .map(|(key, entry)| (key.as_str(), entry))
    }
}

#[derive(Serialize, Deserialize)]
struct RawBaseEntry {
    #[serde(rename = "baseURL", default)]
    base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "requestConfig", default, skip_serializing_if = "Option::is_none")]
    request_config: Option<RequestConfig>,
    #[serde(flatten)]
    leaves: BTreeMap<String, UrlEntry>,
}

impl From<RawBaseEntry> for BaseEntry {
    fn from(raw: RawBaseEntry) -> Self {
        let settings = BaseSettings {
            base_url: raw.base_url,
            url: raw.url,
            request_config: raw.request_config,
        };
        if raw.leaves.is_empty() {
            Self::Simple(settings)
        } else {
            Self::Grouped {
                settings,
                leaves: raw.leaves,
            }
        }
    }
}

impl From<BaseEntry> for RawBaseEntry {
    fn from(entry: BaseEntry) -> Self {
        let (settings, leaves) = match entry {
            BaseEntry::Simple(settings) => (settings, BTreeMap::new()),
            BaseEntry::Grouped { settings, leaves } => (settings, leaves),
        };
        Self {
            base_url: settings.base_url,
            url: settings.url,
            request_config: settings.request_config,
            leaves,
        }
    }
}

/// The full endpoint configuration: base-group key to [`BaseEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(BTreeMap<String, BaseEntry>);

impl ConfigTree {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    #[must_use]
    pub fn with_base(mut self, key: impl Into<String>, entry: BaseEntry) -> Self {
        self.insert(key, entry);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: BaseEntry) -> Option<BaseEntry> {
        self.0.insert(key.into(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&BaseEntry> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut BaseEntry> {
        self.0.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, BaseEntry> {
        self.0.iter()
    }

    /// Decodes a tree from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the input is not a valid tree.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Decodes a tree from TOML, one table per base group.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the input is not a valid tree.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl<'a> IntoIterator for &'a ConfigTree {
    type Item = (&'a String, &'a BaseEntry);
    type IntoIter = btree_map::Iter<'a, String, BaseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, BaseEntry)> for ConfigTree {
    fn from_iter<I: IntoIterator<Item = (String, BaseEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A resolved endpoint, ready for the transport once its URL template has
/// been filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_config: Option<RequestConfig>,
}

impl QueryDescriptor {
    pub(crate) fn from_leaf(settings: &BaseSettings, leaf: Option<&UrlEntry>) -> Self {
        let (url, request_config) = match leaf {
            None => (String::new(), settings.request_config.clone()),
            Some(UrlEntry::Template(url)) => (url.clone(), settings.request_config.clone()),
            Some(UrlEntry::Detailed(leaf)) => {
                let config = match leaf.action() {
                    RequestConfigAction::Overwrite => leaf.request_config.clone(),
                    RequestConfigAction::Merge => merge_request_configs(
                        settings.request_config.as_ref(),
                        leaf.request_config.as_ref(),
                    ),
                };
                (leaf.url.clone(), config)
            }
        };

        Self {
            base_url: settings.base_url.clone(),
            url,
            request_config,
        }
    }

    /// Returns a copy with `{{param}}` placeholders in `url` substituted.
    #[must_use]
    pub fn with_params<K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Display,
    {
        parse_config_url(self, params)
    }
}
