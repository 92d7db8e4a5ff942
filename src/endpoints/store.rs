use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::ConfigError;
use super::mutate::{MutationReport, Updates};
use super::resolve::{LeafKeys, Resolution};
use super::tree::{ConfigTree, QueryDescriptor};

/// Context id used when none is given.
pub const DEFAULT_CONTEXT_ID: &str = "default";

/// A point-in-time view of a scope's tree.
///
/// Snapshots are immutable; later commits produce new snapshots and never
/// alter one that is already held.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    tree: Arc<ConfigTree>,
}

impl Snapshot {
    /// Commit counter of the owning scope. The initial tree is version 0.
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }
}

impl Deref for Snapshot {
    type Target = ConfigTree;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

/// Shared handle to one scope's configuration tree.
///
/// Cloning is cheap; all clones observe the same commits.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    context_id: Arc<str>,
    tx: Arc<watch::Sender<Snapshot>>,
}

impl ConfigHandle {
    /// Creates a standalone handle outside any [`ScopeRegistry`].
    #[must_use]
    pub fn new(context_id: &str, tree: ConfigTree) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            version: 0,
            tree: Arc::new(tree),
        });
        Self {
            context_id: Arc::from(context_id),
            tx: Arc::new(tx),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// The currently committed tree.
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Resolves against the current snapshot. See [`ConfigTree::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn resolve(&self, base: &str, leaves: impl Into<LeafKeys>) -> Result<Resolution, ConfigError> {
        self.snapshot().resolve(base, leaves)
    }

    /// Resolves a single endpoint; `leaf = None` targets the base group.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBase`] when `base` is not declared.
    pub fn query_config(&self, base: &str, leaf: Option<&str>) -> Result<QueryDescriptor, ConfigError> {
        let snapshot = self.snapshot();
        match leaf {
            Some(leaf) => snapshot.resolve_leaf(base, leaf),
            None => snapshot.resolve_base(base),
        }
    }

    /// Applies updates and commits the result as one new snapshot.
    ///
    /// The whole batch is computed on a private copy of the tree before it is
    /// published, so readers see either the previous snapshot or the fully
    /// updated one. Nothing is committed, and subscribers are not notified,
    /// when no target changed.
    ///
    /// # Errors
    ///
    /// See [`ConfigTree::apply`].
    pub fn update(
        &self,
        base: &str,
        leaves: impl Into<LeafKeys>,
        updates: impl Into<Updates>,
    ) -> Result<MutationReport, ConfigError> {
        let leaves = leaves.into();
        let updates = updates.into();
        let mut outcome = Ok(MutationReport::default());
        let mut committed = None;

        self.tx.send_if_modified(|current| {
            let mut next = ConfigTree::clone(&current.tree);
            outcome = next.apply(base, leaves, updates);

            match &outcome {
                Ok(report) if report.changed() => {
                    *current = Snapshot {
                        version: current.version + 1,
                        tree: Arc::new(next),
                    };
                    committed = Some(current.version);
                    true
                }
                _ => false,
            }
        });

        if let (Some(version), Ok(report)) = (committed, &outcome) {
            debug!(
                context_id = %self.context_id,
                base,
                version,
                applied = report.applied,
                rejected = report.rejected.len(),
                "committed configuration update"
            );
        }

        outcome
    }

    /// Replaces the whole tree, as when the owning scope is remounted.
    pub fn replace(&self, tree: ConfigTree) {
        let mut version = 0;
        self.tx.send_modify(|current| {
            *current = Snapshot {
                version: current.version + 1,
                tree: Arc::new(tree),
            };
            version = current.version;
        });
        debug!(context_id = %self.context_id, version, "replaced configuration tree");
    }

    /// A subscription yielding the latest committed snapshot after each
    /// change from now on.
    ///
    /// Commits made between two polls are coalesced: the stream skips to the
    /// newest snapshot instead of replaying every version.
    pub fn subscribe(&self) -> ConfigChanges {
        ConfigChanges {
            context_id: self.context_id.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Subscription source for committed configuration changes.
///
/// Each item is the latest snapshot at the time of polling, so a slow
/// consumer may observe version 1 and then version 3.
///
/// ```rust
/// use rest_queries::endpoints::{ConfigHandle, ConfigTree};
/// use rest_queries::subscription::Subscription;
///
/// let handle = ConfigHandle::new("default", ConfigTree::new());
/// let changes = Subscription::new(handle.subscribe()).map(|snapshot| snapshot.version());
/// ```
pub struct ConfigChanges {
    context_id: Arc<str>,
    rx: watch::Receiver<Snapshot>,
}

impl SubscriptionSource for ConfigChanges {
    type Output = Snapshot;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        WatchStream::from_changes(self.rx.clone()).boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.context_id.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

/// Registry of isolated configuration scopes keyed by context id.
///
/// Scopes are created on first reference and live as long as the registry.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: DashMap<String, ConfigHandle>,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scope for `context_id`, creating it with an empty tree.
    pub fn scope(&self, context_id: Option<&str>) -> ConfigHandle {
        let id = context_id.unwrap_or(DEFAULT_CONTEXT_ID);
        self.scopes
            .entry(id.to_owned())
            .or_insert_with(|| {
                debug!(context_id = id, "created configuration scope");
                ConfigHandle::new(id, ConfigTree::new())
            })
            .clone()
    }

    /// Installs `tree` as the scope's configuration.
    ///
    /// A scope that already exists keeps its handle, so existing subscribers
    /// are notified of the replacement.
    pub fn mount(&self, context_id: Option<&str>, tree: ConfigTree) -> ConfigHandle {
        let id = context_id.unwrap_or(DEFAULT_CONTEXT_ID);
        match self.scopes.entry(id.to_owned()) {
            Entry::Occupied(entry) => {
                let handle = entry.get().clone();
                drop(entry);
                handle.replace(tree);
                handle
            }
            Entry::Vacant(entry) => {
                debug!(context_id = id, "mounted configuration scope");
                entry.insert(ConfigHandle::new(id, tree)).clone()
            }
        }
    }

    pub fn contains(&self, context_id: &str) -> bool {
        self.scopes.contains_key(context_id)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
