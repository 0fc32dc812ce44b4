//! Test fixtures and tree helpers.
//!
//! Provides a transaction manager wired to an in-memory store and change
//! log that tests can inspect directly, plus builders for common shapes.

use iotdm_core::{
    InMemoryRemoteCseRegistry, MemoryChangeLog, NewResource, ResourceSnapshot, ResourceTreeReader,
    ResourceTreeWriter, StripedLocker, TransactionManager, TreeComponents, TreeConfig,
};
use iotdm_store::{InMemoryStore, ResourceId, ResourceStore, ResourceType};
use std::sync::Arc;

/// A resource tree whose store and change log stay reachable.
pub struct TestTree {
    /// The transaction manager under test.
    pub tm: TransactionManager,
    /// The backing store, for counters and failure injection.
    pub store: Arc<InMemoryStore>,
    /// The notifier's destination.
    pub log: Arc<MemoryChangeLog>,
    /// The live remote-CSE registry.
    pub registry: Arc<InMemoryRemoteCseRegistry>,
}

impl TestTree {
    /// Creates an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Creates an empty tree with `config`.
    pub fn with_config(config: TreeConfig) -> Self {
        Self::from_store(Arc::new(InMemoryStore::new()), config)
    }

    /// Creates a tree over an already seeded store.
    pub fn from_store(store: Arc<InMemoryStore>, config: TreeConfig) -> Self {
        let log = Arc::new(MemoryChangeLog::new());
        let registry = Arc::new(InMemoryRemoteCseRegistry::new());
        let components = TreeComponents {
            locker: Arc::new(StripedLocker::default()),
            change_log: log.clone(),
            remote_cses: registry.clone(),
        };
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        let tm = TransactionManager::with_components(dyn_store, config, components)
            .expect("Failed to build transaction manager");
        Self {
            tm,
            store,
            log,
            registry,
        }
    }

    /// A fresh writer.
    pub fn writer(&self) -> ResourceTreeWriter {
        self.tm.writer()
    }

    /// The shared reader.
    pub fn reader(&self) -> Arc<ResourceTreeReader> {
        self.tm.reader()
    }

    /// Creates a resource with a store-assigned id.
    pub fn create(&self, name: &str, parent_id: &ResourceId, resource_type: ResourceType) -> ResourceId {
        self.create_with_content(name, parent_id, resource_type, "{}")
    }

    /// Creates a resource with the given content.
    pub fn create_with_content(
        &self,
        name: &str,
        parent_id: &ResourceId,
        resource_type: ResourceType,
        content_json: &str,
    ) -> ResourceId {
        let writer = self.writer();
        let id = writer
            .generate_resource_id()
            .expect("Failed to allocate resource id");
        writer
            .create_resource(
                &NewResource::new(id.clone(), name, parent_id.clone(), resource_type)
                    .with_content_json(content_json),
            )
            .expect("Failed to create resource");
        id
    }

    /// Creates a CSE base and registers its name.
    pub fn create_cse(&self, name: &str) -> ResourceId {
        let id = self.create(name, &ResourceId::null(), ResourceType::CSE_BASE);
        self.writer()
            .create_cse_by_name(name, &id)
            .expect("Failed to register CSE");
        id
    }

    /// Creates a typed child and appends it to its sibling chain.
    pub fn append(&self, parent_id: &ResourceId, resource_type: ResourceType, name: &str) -> ResourceId {
        let id = self.create(name, parent_id, resource_type);
        self.writer()
            .initialize_element_in_parent_list(resource_type, parent_id, &id, name)
            .expect("Failed to append to sibling chain");
        id
    }

    /// Oldest-to-latest walk of a sibling chain.
    pub fn chain(&self, parent_id: &ResourceId, resource_type: ResourceType) -> Vec<ResourceId> {
        self.reader().sibling_chain(parent_id, resource_type)
    }

    /// Latest-to-oldest walk of a sibling chain.
    pub fn chain_reversed(&self, parent_id: &ResourceId, resource_type: ResourceType) -> Vec<ResourceId> {
        self.reader().sibling_chain_reversed(parent_id, resource_type)
    }

    /// Snapshot of a live resource.
    pub fn snapshot(&self, resource_id: &ResourceId) -> ResourceSnapshot {
        self.reader()
            .retrieve_resource_by_id(resource_id)
            .expect("Resource should exist")
            .snapshot()
    }

    /// Returns true if the store still holds the resource record.
    pub fn exists_in_store(&self, resource_id: &ResourceId) -> bool {
        self.store
            .retrieve_resource_by_id(resource_id)
            .expect("Store read failed")
            .is_some()
    }

    /// Number of edges the store holds under `parent_id`.
    pub fn store_child_count(&self, parent_id: &ResourceId) -> usize {
        self.store
            .retrieve_parent_child_list(parent_id)
            .expect("Store read failed")
            .map_or(0, |edges| edges.len())
    }

    /// Edges in the store that point at a missing resource.
    pub fn orphaned_edges(&self) -> Vec<(ResourceId, String)> {
        let resources = self
            .store
            .retrieve_full_resource_list()
            .expect("Store read failed");
        let mut orphans = Vec::new();
        for parent in &resources {
            let edges = self
                .store
                .retrieve_parent_child_list(&parent.resource_id)
                .expect("Store read failed")
                .unwrap_or_default();
            for edge in edges {
                if !self.exists_in_store(&edge.resource_id) {
                    orphans.push((parent.resource_id.clone(), edge.name));
                }
            }
        }
        orphans
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestTree {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.tm
    }
}

/// Runs a test with a fresh tree.
///
/// # Example
///
/// ```rust
/// use iotdm_testkit::with_test_tree;
///
/// with_test_tree(|tree| {
///     assert!(tree.reader().retrieve_cse("InCSE1").is_none());
/// });
/// ```
pub fn with_test_tree<F, R>(f: F) -> R
where
    F: FnOnce(&TestTree) -> R,
{
    let tree = TestTree::new();
    f(&tree)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A CSE with one container holding `count` chained content instances.
    ///
    /// Returns the tree, the container id and the instance ids in append
    /// order.
    pub fn container_with_instances(count: usize) -> (TestTree, ResourceId, Vec<ResourceId>) {
        container_with_instances_in(TestTree::new(), count)
    }

    /// Same as [`container_with_instances`] on an existing tree.
    pub fn container_with_instances_in(
        tree: TestTree,
        count: usize,
    ) -> (TestTree, ResourceId, Vec<ResourceId>) {
        let cse = tree.create_cse("InCSE1");
        let cnt = tree.create("cnt", &cse, ResourceType::CONTAINER);
        let instances = (0..count)
            .map(|i| tree.append(&cnt, ResourceType::CONTENT_INSTANCE, &format!("cin{i}")))
            .collect();
        (tree, cnt, instances)
    }

    /// `count` empty containers directly under the delete root.
    pub fn populated_delete_root(count: usize) -> TestTree {
        let tree = TestTree::new();
        let root = ResourceId::delete_root();
        for i in 0..count {
            tree.create(&format!("trash{i}"), &root, ResourceType::CONTAINER);
        }
        tree
    }

    /// A CSE holding the chain A -> B -> C. Returns the tree, the CSE id and
    /// the three ids from top to bottom.
    pub fn three_level_chain() -> (TestTree, ResourceId, [ResourceId; 3]) {
        let tree = TestTree::new();
        let cse = tree.create_cse("InCSE1");
        let a = tree.create("a", &cse, ResourceType::AE);
        let b = tree.create("b", &a, ResourceType::CONTAINER);
        let c = tree.create("c", &b, ResourceType::CONTAINER);
        (tree, cse, [a, b, c])
    }
}
