//! Components shared by every writer and background worker.

use crate::cache::Cache;
use crate::config::TreeConfig;
use crate::notifier::DbNotifier;
use crate::reader::ResourceTreeReader;
use iotdm_store::ResourceStore;
use std::sync::Arc;

/// The single store, cache, reader and notifier of one tree.
///
/// Writers are cheap wrappers around an `Arc<TreeContext>`.
pub struct TreeContext {
    store: Arc<dyn ResourceStore>,
    cache: Arc<Cache>,
    reader: Arc<ResourceTreeReader>,
    notifier: Arc<DbNotifier>,
    config: TreeConfig,
}

impl TreeContext {
    /// Bundles the shared components.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<Cache>,
        reader: Arc<ResourceTreeReader>,
        notifier: Arc<DbNotifier>,
        config: TreeConfig,
    ) -> Self {
        Self {
            store,
            cache,
            reader,
            notifier,
            config,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// The cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The reader.
    #[must_use]
    pub fn reader(&self) -> &Arc<ResourceTreeReader> {
        &self.reader
    }

    /// The notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<DbNotifier> {
        &self.notifier
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }
}

impl std::fmt::Debug for TreeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeContext")
            .field("cache", &self.cache)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
