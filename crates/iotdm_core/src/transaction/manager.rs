//! Transaction manager.

use crate::bg_delete::BackgroundDeleteProcessor;
use crate::cache::{Cache, ResourceSnapshot};
use crate::config::TreeConfig;
use crate::context::TreeContext;
use crate::error::TreeResult;
use crate::gc::TtlGarbageCollector;
use crate::locker::{Locker, StripedLocker};
use crate::notifier::{ChangeLog, DbNotifier, MemoryChangeLog};
use crate::reader::ResourceTreeReader;
use crate::remote_cse::{NoRemoteCses, RemoteCseRegistry};
use crate::stats::TreeCacheStats;
use crate::writer::ResourceTreeWriter;
use iotdm_store::{ResourceId, ResourceStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Pluggable collaborators of a [`TransactionManager`].
pub struct TreeComponents {
    /// Mutual-exclusion coordinator shared with the TTL collector.
    pub locker: Arc<dyn Locker>,
    /// Destination of the notifier's batches.
    pub change_log: Arc<dyn ChangeLog>,
    /// Live remote-CSE registry consulted by the reader.
    pub remote_cses: Arc<dyn RemoteCseRegistry>,
}

impl Default for TreeComponents {
    fn default() -> Self {
        Self {
            locker: Arc::new(StripedLocker::default()),
            change_log: Arc::new(MemoryChangeLog::new()),
            remote_cses: Arc::new(NoRemoteCses),
        }
    }
}

impl std::fmt::Debug for TreeComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeComponents").finish_non_exhaustive()
    }
}

/// Composition root of one resource tree.
///
/// The manager owns:
/// - the single cache and reader
/// - the locker
/// - the TTL garbage collector and the background-delete processor
/// - the notifier
///
/// Writers are created per call with [`TransactionManager::writer`] and
/// share everything above.
///
/// ## Lifecycle
///
/// [`TransactionManager::new`] builds the components without starting any
/// thread. [`TransactionManager::start_background_workers`] (or
/// [`TransactionManager::open`]) starts them; [`TransactionManager::close`]
/// stops and joins them, then closes the store.
pub struct TransactionManager {
    context: Arc<TreeContext>,
    locker: Arc<dyn Locker>,
    gc: Arc<TtlGarbageCollector>,
    deleter: Arc<BackgroundDeleteProcessor>,
    closed: AtomicBool,
}

impl TransactionManager {
    /// Builds a tree over `store` with default components.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete root cannot be created.
    pub fn new(store: Arc<dyn ResourceStore>, config: TreeConfig) -> TreeResult<Self> {
        Self::with_components(store, config, TreeComponents::default())
    }

    /// Builds a tree over `store` with the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete root cannot be created.
    pub fn with_components(
        store: Arc<dyn ResourceStore>,
        config: TreeConfig,
        components: TreeComponents,
    ) -> TreeResult<Self> {
        let cache = Arc::new(Cache::new(Arc::clone(&store), &config));
        let reader = Arc::new(ResourceTreeReader::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            components.remote_cses,
        ));
        let notifier = Arc::new(DbNotifier::new(
            components.change_log,
            config.notifier_batch_size,
            config.notifier_poll_timeout,
        ));
        let gc_interval = config.gc_interval;
        let context = Arc::new(TreeContext::new(store, cache, reader, notifier, config));

        ResourceTreeWriter::new(Arc::clone(&context)).ensure_delete_root()?;

        let gc = Arc::new(TtlGarbageCollector::new(
            Arc::clone(&context),
            Arc::clone(&components.locker),
            gc_interval,
        ));
        let deleter = Arc::new(BackgroundDeleteProcessor::new(Arc::clone(&context)));
        debug!("transaction manager created");

        Ok(Self {
            context,
            locker: components.locker,
            gc,
            deleter,
            closed: AtomicBool::new(false),
        })
    }

    /// Builds a tree with default components and starts its workers.
    ///
    /// # Errors
    ///
    /// Returns an error if construction fails or a thread cannot be spawned.
    pub fn open(store: Arc<dyn ResourceStore>, config: TreeConfig) -> TreeResult<Self> {
        let manager = Self::new(store, config)?;
        manager.start_background_workers()?;
        Ok(manager)
    }

    /// Starts the notifier writer, the TTL collector and the delete
    /// processor.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn start_background_workers(&self) -> TreeResult<()> {
        self.context.notifier().start()?;
        self.gc.start()?;
        self.deleter.start()?;
        info!("background workers started");
        Ok(())
    }

    /// Stops and joins every background worker. Queued relocations and
    /// notifications are processed before the threads exit.
    pub fn stop_background_workers(&self) {
        self.deleter.stop();
        self.gc.stop();
        self.context.notifier().stop();
    }

    /// Stops the workers, flushes pending notifications and closes the
    /// store. Calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to close.
    pub fn close(&self) -> TreeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_background_workers();
        self.context.notifier().process_pending();
        self.context.store().close()?;
        info!("transaction manager closed");
        Ok(())
    }

    /// Returns true once [`TransactionManager::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The shared reader.
    #[must_use]
    pub fn reader(&self) -> Arc<ResourceTreeReader> {
        Arc::clone(self.context.reader())
    }

    /// A fresh writer sharing this tree's cache and store.
    #[must_use]
    pub fn writer(&self) -> ResourceTreeWriter {
        ResourceTreeWriter::new(Arc::clone(&self.context))
    }

    /// The locker.
    #[must_use]
    pub fn locker(&self) -> &Arc<dyn Locker> {
        &self.locker
    }

    /// The TTL garbage collector.
    #[must_use]
    pub fn gc(&self) -> &Arc<TtlGarbageCollector> {
        &self.gc
    }

    /// The background-delete processor.
    #[must_use]
    pub fn delete_processor(&self) -> &Arc<BackgroundDeleteProcessor> {
        &self.deleter
    }

    /// The notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<DbNotifier> {
        self.context.notifier()
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<TreeContext> {
        &self.context
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        self.context.config()
    }

    /// Cache counters for every table.
    #[must_use]
    pub fn cache_stats(&self) -> TreeCacheStats {
        self.context.cache().stats()
    }

    /// Flags a resource for the next TTL epoch.
    pub fn add_garbage(&self, snapshot: ResourceSnapshot) {
        self.gc.add_garbage(snapshot);
    }

    /// Queues a resource for relocation under the delete root.
    pub fn move_resource_to_delete_parent(&self, resource_id: &ResourceId) {
        self.deleter.move_resource_to_delete_parent(resource_id);
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.stop_background_workers();
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("context", &self.context)
            .field("gc", &self.gc)
            .field("deleter", &self.deleter)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use crate::request::NewResource;
    use iotdm_store::{InMemoryStore, ResourceType};
    use std::time::Duration;

    #[test]
    fn new_creates_delete_root_without_threads() {
        let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), TreeConfig::default()).unwrap();
        assert!(tm
            .reader()
            .retrieve_resource_by_id(&ResourceId::delete_root())
            .is_some());
        assert!(!tm.notifier().is_running());
        assert!(!tm.gc().is_running());
        assert!(!tm.delete_processor().is_running());
    }

    #[test]
    fn writers_share_the_cache() {
        let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), TreeConfig::default()).unwrap();
        let id = tm.writer().generate_resource_id().unwrap();
        tm.writer()
            .create_resource(&NewResource::new(
                id.clone(),
                "InCSE1",
                ResourceId::null(),
                ResourceType::CSE_BASE,
            ))
            .unwrap();

        let before = tm.cache_stats().resources.hits;
        assert!(tm.reader().retrieve_resource_by_id(&id).is_some());
        assert_eq!(tm.cache_stats().resources.hits, before + 1);
    }

    #[test]
    fn open_and_close_lifecycle() {
        let store = Arc::new(InMemoryStore::new());
        let config = TreeConfig::default()
            .gc_interval(Duration::from_millis(20))
            .delete_epoch_interval(Duration::from_millis(20));
        let tm = TransactionManager::open(store, config).unwrap();
        assert!(tm.gc().is_running());
        assert!(tm.delete_processor().is_running());
        assert!(tm.notifier().is_running());

        tm.close().unwrap();
        assert!(tm.is_closed());
        assert!(!tm.gc().is_running());
        tm.close().unwrap();

        let err = tm.writer().generate_resource_id().unwrap_err();
        assert!(matches!(err, TreeError::Store(_)));
    }
}
