use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use super::ConfigError;
use super::merge::merge_into;
use super::resolve::LeafKeys;
use super::tree::{BaseEntry, BaseSettings, ConfigTree, RequestConfig, RequestConfigAction, UrlEntry, UrlSettings};

/// A partial update for a base group or an object-shaped leaf.
///
/// Present fields replace the stored value, except `request_config`, which is
/// deep-merged into the stored config. `base_url` and `leaves` only apply to
/// base groups and `request_config_action` only to leaves.
///
/// On the wire a patch has the shape of a base entry: any key other than the
/// named fields is a leaf. A patched leaf replaces a bare-string leaf (or
/// adds a new one) and is merged into an object-shaped one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_config: Option<RequestConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_config_action: Option<RequestConfigAction>,
    #[serde(flatten)]
    pub leaves: BTreeMap<String, UrlEntry>,
}

impl ConfigPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn request_config(mut self, config: RequestConfig) -> Self {
        self.request_config = Some(config);
        self
    }

    #[must_use]
    pub const fn action(mut self, action: RequestConfigAction) -> Self {
        self.request_config_action = Some(action);
        self
    }

    /// Adds a leaf update for [`ConfigTree::apply`] on the base group.
    #[must_use]
    pub fn leaf(mut self, key: impl Into<String>, entry: impl Into<UrlEntry>) -> Self {
        self.leaves.insert(key.into(), entry.into());
        self
    }

    fn apply_to_base(self, entry: &mut BaseEntry) {
        let settings: &mut BaseSettings = entry.settings_mut();
        if let Some(base_url) = self.base_url {
            settings.base_url = base_url;
        }
        if let Some(url) = self.url {
            settings.url = Some(url);
        }
        if let Some(config) = self.request_config {
            merge_into(&mut settings.request_config, config);
        }

        for (key, update) in self.leaves {
            match entry.leaf_mut(&key) {
                Some(existing) => merge_leaf(existing, update),
                None => {
                    entry.insert_leaf(key, update);
                }
            }
        }
    }

    fn apply_to_leaf(self, settings: &mut UrlSettings) {
        if let Some(url) = self.url {
            settings.url = url;
        }
        if let Some(config) = self.request_config {
            merge_into(&mut settings.request_config, config);
        }
        if let Some(action) = self.request_config_action {
            settings.request_config_action = Some(action);
        }
    }
}

fn merge_leaf(existing: &mut UrlEntry, update: UrlEntry) {
    match (existing, update) {
        (UrlEntry::Detailed(settings), UrlEntry::Detailed(update)) => {
            settings.url = update.url;
            if let Some(config) = update.request_config {
                merge_into(&mut settings.request_config, config);
            }
            if let Some(action) = update.request_config_action {
                settings.request_config_action = Some(action);
            }
        }
        (existing, update) => *existing = update,
    }
}

/// One patch, or one patch per leaf key.
#[derive(Debug, Clone, PartialEq)]
pub enum Updates {
    One(ConfigPatch),
    Many(Vec<ConfigPatch>),
}

impl Updates {
    fn describe(&self) -> String {
        match self {
            Self::One(_) => "a single update".to_string(),
            Self::Many(patches) => format!("{} updates", patches.len()),
        }
    }
}

impl From<ConfigPatch> for Updates {
    fn from(patch: ConfigPatch) -> Self {
        Self::One(patch)
    }
}

impl From<Vec<ConfigPatch>> for Updates {
    fn from(patches: Vec<ConfigPatch>) -> Self {
        Self::Many(patches)
    }
}

/// What a mutation did. Rejected targets leave their entry untouched.
///
/// `unchanged` counts targets whose patch was valid but left the entry as it
/// was, such as an empty patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub applied: usize,
    pub unchanged: usize,
    pub rejected: Vec<ConfigError>,
}

impl MutationReport {
    /// `true` when at least one target was updated.
    pub const fn changed(&self) -> bool {
        self.applied > 0
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl ConfigTree {
    /// Applies partial updates to a base group or some of its leaves.
    ///
    /// Targets are updated independently: a bare-string leaf cannot be merged
    /// with a patch, so it is reported in [`MutationReport::rejected`] and
    /// logged while its siblings are still applied. A leaf key that is not
    /// declared in the group targets the base group itself.
    ///
    /// # Errors
    ///
    /// Fails without touching the tree when `leaves` and `updates` disagree in
    /// shape (one key with many patches, many keys with one patch, or lists
    /// of different lengths) or when `base` is not declared.
    pub fn apply(
        &mut self,
        base: &str,
        leaves: impl Into<LeafKeys>,
        updates: impl Into<Updates>,
    ) -> Result<MutationReport, ConfigError> {
        let targets = pair_targets(leaves.into(), updates.into()).inspect_err(|e| {
            error!(base, error = %e, "rejected configuration update");
        })?;
        let entry = self
            .get_mut(base)
            .ok_or_else(|| ConfigError::unknown_base(base))?;

        let mut report = MutationReport::default();
        for (leaf, patch) in targets {
            match apply_one(entry, base, leaf.as_deref(), patch) {
                Ok(true) => report.applied += 1,
                Ok(false) => {
                    trace!(base, leaf = leaf.as_deref(), "update left entry unchanged");
                    report.unchanged += 1;
                }
                Err(e) => {
                    error!(base, leaf = leaf.as_deref(), "{e}");
                    report.rejected.push(e);
                }
            }
        }

        Ok(report)
    }
}

fn pair_targets(
    leaves: LeafKeys,
    updates: Updates,
) -> Result<Vec<(Option<String>, ConfigPatch)>, ConfigError> {
    match (leaves, updates) {
        (LeafKeys::None, Updates::One(patch)) => Ok(vec![(None, patch)]),
        (LeafKeys::One(leaf), Updates::One(patch)) => Ok(vec![(Some(leaf), patch)]),
        (LeafKeys::Many(keys), Updates::Many(patches)) if keys.len() == patches.len() => {
            Ok(keys.into_iter().map(Some).zip(patches).collect())
        }
        (leaves, updates) => Err(ConfigError::ShapeMismatch {
            leaves: leaves.describe(),
            updates: updates.describe(),
        }),
    }
}

/// Returns whether the entry differs afterwards.
fn apply_one(
    entry: &mut BaseEntry,
    base: &str,
    leaf: Option<&str>,
    patch: ConfigPatch,
) -> Result<bool, ConfigError> {
    let target = leaf.and_then(|key| entry.leaf(key).map(|_| key));

    match target {
        None => {
            let before = entry.clone();
            patch.apply_to_base(entry);
            Ok(*entry != before)
        }
        Some(key) => match entry.leaf_mut(key) {
            Some(UrlEntry::Detailed(settings)) => {
                let before = settings.clone();
                patch.apply_to_leaf(settings);
                Ok(*settings != before)
            }
            _ => Err(ConfigError::NotMergeable {
                base: base.to_owned(),
                leaf: key.to_owned(),
            }),
        },
    }
}
