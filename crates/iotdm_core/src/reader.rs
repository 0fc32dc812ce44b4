//! Read-only navigation over the resource tree.
//!
//! Lookups go through the cache. The `dump_*` helpers and
//! [`ResourceTreeReader::hierarchy_snapshot`] read the backing store
//! directly so they show what is actually persisted.

use crate::cache::{Cache, ResourceElem};
use crate::remote_cse::RemoteCseRegistry;
use iotdm_store::{
    CseRecord, OldestLatest, ParentChildEdge, ResourceId, ResourceStore, ResourceType,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// A persisted subtree, as read from the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    /// Resource id.
    pub resource_id: ResourceId,
    /// Edge name under the parent (the resource name for roots).
    pub name: String,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Children in child-list order.
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::len).sum::<usize>()
    }

    /// Always false; a node counts itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Cache-aware read facade.
pub struct ResourceTreeReader {
    store: Arc<dyn ResourceStore>,
    cache: Arc<Cache>,
    remote_cses: Arc<dyn RemoteCseRegistry>,
}

impl ResourceTreeReader {
    /// Creates a reader over `cache`, falling back to `store` where the
    /// cache has no table.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<Cache>,
        remote_cses: Arc<dyn RemoteCseRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            remote_cses,
        }
    }

    // === CSEs ===

    /// Looks up a CSE by name.
    pub fn retrieve_cse_by_name(&self, name: &str) -> Option<Arc<CseRecord>> {
        self.cache.retrieve_cse_by_name(name)
    }

    /// Looks up a CSE by name, then by resource id.
    ///
    /// The id fallback scans the full CSE list.
    pub fn retrieve_cse(&self, identifier: &str) -> Option<Arc<CseRecord>> {
        if let Some(cse) = self.retrieve_cse_by_name(identifier) {
            return Some(cse);
        }
        self.get_cse_list()
            .into_iter()
            .find(|cse| cse.resource_id.as_str() == identifier)
            .map(Arc::new)
    }

    /// Every CSE in the backing store.
    pub fn get_cse_list(&self) -> Vec<CseRecord> {
        self.store.retrieve_full_cse_list().unwrap_or_else(|e| {
            error!(error = %e, "failed to read CSE list");
            Vec::new()
        })
    }

    // === Resources ===

    /// Looks up a resource by id.
    pub fn retrieve_resource_by_id(&self, resource_id: &ResourceId) -> Option<Arc<ResourceElem>> {
        self.cache.retrieve_resource_by_id(resource_id)
    }

    /// Returns the head and tail of `resource_type`'s sibling chain under
    /// `resource_id`, or `None` if the resource has no such chain.
    pub fn retrieve_oldest_latest_by_resource_type(
        &self,
        resource_id: &ResourceId,
        resource_type: ResourceType,
    ) -> Option<OldestLatest> {
        self.retrieve_resource_by_id(resource_id)?
            .oldest_latest(resource_type)
    }

    /// Returns the resource's content, reloading it from the store if the
    /// cached copy did not retain it.
    pub fn resource_content_json(&self, elem: &ResourceElem) -> Option<String> {
        if let Some(content) = elem.retained_content() {
            return Some(content);
        }
        match self.store.retrieve_resource_by_id(elem.resource_id()) {
            Ok(Some(stored)) => {
                elem.set_content(&stored.content_json, self.cache.retain_threshold());
                Some(stored.content_json)
            }
            Ok(None) => None,
            Err(e) => {
                error!(resource_id = %elem.resource_id(), error = %e, "failed to reload content");
                None
            }
        }
    }

    // === Children ===

    /// Every child edge of `resource_id`, in child-map order.
    pub fn retrieve_parent_child_list(&self, resource_id: &ResourceId) -> Vec<ParentChildEdge> {
        self.retrieve_parent_child_list_page(resource_id, 0, 0)
    }

    /// The first `limit` child edges of `resource_id`.
    pub fn retrieve_parent_child_list_limit_n(
        &self,
        resource_id: &ResourceId,
        limit: i64,
    ) -> Vec<ParentChildEdge> {
        self.retrieve_parent_child_list_page(resource_id, limit, 0)
    }

    /// A page of child edges. `limit <= 0` means no limit.
    pub fn retrieve_parent_child_list_page(
        &self,
        resource_id: &ResourceId,
        limit: i64,
        offset: i64,
    ) -> Vec<ParentChildEdge> {
        self.cache
            .retrieve_parent_child_list(resource_id, limit, offset)
            .unwrap_or_default()
    }

    /// The named edge under `parent_id`.
    pub fn retrieve_child_by_name(&self, parent_id: &ResourceId, name: &str) -> Option<ParentChildEdge> {
        self.cache.retrieve_child_by_name(parent_id, name)
    }

    /// The id of the named child.
    pub fn retrieve_child_resource_id_by_name(
        &self,
        parent_id: &ResourceId,
        name: &str,
    ) -> Option<ResourceId> {
        self.retrieve_child_by_name(parent_id, name)
            .map(|edge| edge.resource_id)
    }

    /// The named child resource.
    pub fn retrieve_child_resource_by_name(
        &self,
        parent_id: &ResourceId,
        name: &str,
    ) -> Option<Arc<ResourceElem>> {
        let child_id = self.retrieve_child_resource_id_by_name(parent_id, name)?;
        self.retrieve_resource_by_id(&child_id)
    }

    /// Walks `resource_type`'s chain under `parent_id` from oldest to latest.
    ///
    /// The walk follows `next` pointers and stops at the null sentinel, at a
    /// missing link, or after visiting every child once.
    pub fn sibling_chain(&self, parent_id: &ResourceId, resource_type: ResourceType) -> Vec<ResourceId> {
        let Some(ol) = self.retrieve_oldest_latest_by_resource_type(parent_id, resource_type) else {
            return Vec::new();
        };
        self.walk_chain(parent_id, ol.oldest_id, |edge| &edge.next_id)
    }

    /// Walks `resource_type`'s chain under `parent_id` from latest to oldest.
    pub fn sibling_chain_reversed(
        &self,
        parent_id: &ResourceId,
        resource_type: ResourceType,
    ) -> Vec<ResourceId> {
        let Some(ol) = self.retrieve_oldest_latest_by_resource_type(parent_id, resource_type) else {
            return Vec::new();
        };
        self.walk_chain(parent_id, ol.latest_id, |edge| &edge.prev_id)
    }

    fn walk_chain(
        &self,
        parent_id: &ResourceId,
        start: ResourceId,
        step: impl Fn(&ParentChildEdge) -> &ResourceId,
    ) -> Vec<ResourceId> {
        let bound = self
            .cache
            .retrieve_child_map(parent_id)
            .map_or(0, |map| map.read().len());
        let mut chain = Vec::new();
        let mut current = start;
        while !current.is_null() && chain.len() < bound {
            let Some(elem) = self.retrieve_resource_by_id(&current) else {
                break;
            };
            let Some(edge) = self.retrieve_child_by_name(parent_id, elem.name()) else {
                break;
            };
            let next = step(&edge).clone();
            chain.push(current);
            current = next;
        }
        chain
    }

    // === Registration ===

    /// Resolves an AE-ID under a CSE.
    pub fn retrieve_ae_resource_id_by_ae_id(&self, cse_name: &str, ae_id: &str) -> Option<ResourceId> {
        self.cache.retrieve_ae_resource_id(cse_name, ae_id)
    }

    /// Returns true if `entity_id` is a registered remote CSE or AE of
    /// `cse_base_id`.
    ///
    /// The live remote-CSE registry answers first; the AE table and the
    /// persisted remote-CSE mappings are the fallback.
    pub fn is_entity_registered(&self, entity_id: &str, cse_base_id: &str) -> bool {
        if self.remote_cses.is_remote_cse_registered(cse_base_id, entity_id) {
            return true;
        }
        if self.retrieve_ae_resource_id_by_ae_id(cse_base_id, entity_id).is_some() {
            return true;
        }
        match self.store.retrieve_remote_cse_resource_id(cse_base_id, entity_id) {
            Ok(found) => found.is_some(),
            Err(e) => {
                error!(cse = cse_base_id, entity_id, error = %e, "remote CSE lookup failed");
                false
            }
        }
    }

    // === Diagnostics (store only) ===

    /// Builds the persisted subtree under `root_id`.
    pub fn hierarchy_snapshot(&self, root_id: &ResourceId) -> Option<HierarchyNode> {
        let root = match self.store.retrieve_resource_by_id(root_id) {
            Ok(found) => found?,
            Err(e) => {
                error!(resource_id = %root_id, error = %e, "failed to read resource");
                return None;
            }
        };
        Some(self.hierarchy_node(root.resource_id, root.name, root.resource_type))
    }

    fn hierarchy_node(
        &self,
        resource_id: ResourceId,
        name: String,
        resource_type: ResourceType,
    ) -> HierarchyNode {
        let edges = self
            .store
            .retrieve_parent_child_list(&resource_id)
            .ok()
            .flatten()
            .unwrap_or_default();
        let children = edges
            .into_iter()
            .map(|edge| {
                let child_type = self
                    .store
                    .retrieve_resource_by_id(&edge.resource_id)
                    .ok()
                    .flatten()
                    .map_or(ResourceType::SYSTEM, |r| r.resource_type);
                self.hierarchy_node(edge.resource_id, edge.name, child_type)
            })
            .collect();
        HierarchyNode {
            resource_id,
            name,
            resource_type,
            children,
        }
    }

    /// Logs every CSE and resource record in the store.
    pub fn dump_raw_tree_to_log(&self) {
        info!("raw CSE list:");
        for cse in self.get_cse_list() {
            info!(name = %cse.name, resource_id = %cse.resource_id, "cse");
        }
        info!("raw resource list:");
        match self.store.retrieve_full_resource_list() {
            Ok(resources) => {
                for r in resources {
                    info!(
                        resource_id = %r.resource_id,
                        name = %r.name,
                        parent_id = %r.parent_id,
                        resource_type = %r.resource_type,
                        "resource"
                    );
                }
            }
            Err(e) => error!(error = %e, "failed to read resource list"),
        }
    }

    /// Logs the persisted tree under `root_id`, or under every CSE.
    pub fn dump_hierarchical_tree_to_log(&self, root_id: Option<&ResourceId>) {
        let roots: Vec<ResourceId> = match root_id {
            Some(id) => vec![id.clone()],
            None => self.get_cse_list().into_iter().map(|c| c.resource_id).collect(),
        };
        for root in roots {
            match self.hierarchy_snapshot(&root) {
                Some(node) => log_node(&node, 0),
                None => info!(resource_id = %root, "no such resource"),
            }
        }
    }

    /// Logs one persisted resource and its child edges.
    pub fn dump_resource_to_log(&self, resource_id: &ResourceId) {
        match self.store.retrieve_resource_by_id(resource_id) {
            Ok(Some(r)) => {
                info!(
                    resource_id = %r.resource_id,
                    name = %r.name,
                    parent_id = %r.parent_id,
                    resource_type = %r.resource_type,
                    content = %r.content_json,
                    "resource"
                );
                for ol in &r.oldest_latest {
                    info!(
                        resource_type = %ol.resource_type,
                        oldest = %ol.oldest_id,
                        latest = %ol.latest_id,
                        "oldest/latest"
                    );
                }
                let edges = self
                    .store
                    .retrieve_parent_child_list(resource_id)
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                for edge in edges {
                    info!(
                        name = %edge.name,
                        child = %edge.resource_id,
                        prev = %edge.prev_id,
                        next = %edge.next_id,
                        "child"
                    );
                }
            }
            Ok(None) => info!(resource_id = %resource_id, "no such resource"),
            Err(e) => error!(resource_id = %resource_id, error = %e, "failed to read resource"),
        }
    }

    /// Logs `resource_type`'s chain under `parent_id` in both directions.
    pub fn dump_oldest_latest_chain_to_log(&self, parent_id: &ResourceId, resource_type: ResourceType) {
        let forward = self.sibling_chain(parent_id, resource_type);
        let backward = self.sibling_chain_reversed(parent_id, resource_type);
        info!(
            parent_id = %parent_id,
            resource_type = %resource_type,
            oldest_to_latest = ?forward,
            latest_to_oldest = ?backward,
            "sibling chain"
        );
    }
}

fn log_node(node: &HierarchyNode, depth: usize) {
    info!(
        "{:indent$}{} [{}] {}",
        "",
        node.name,
        node.resource_type,
        node.resource_id,
        indent = depth * 2
    );
    for child in &node.children {
        log_node(child, depth + 1);
    }
}

impl std::fmt::Debug for ResourceTreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTreeReader")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::remote_cse::{InMemoryRemoteCseRegistry, NoRemoteCses};
    use iotdm_store::{InMemoryStore, StoredResource};

    fn stored(id: &str, name: &str, parent: &str, ty: ResourceType) -> StoredResource {
        StoredResource {
            resource_id: id.into(),
            name: name.into(),
            parent_id: parent.into(),
            resource_type: ty,
            content_json: "{}".into(),
            parent_target_uri: String::new(),
            oldest_latest: Vec::new(),
        }
    }

    fn seeded() -> (Arc<InMemoryStore>, ResourceTreeReader) {
        let store = Arc::new(InMemoryStore::new());
        store.create_cse_by_name("InCSE1", &"2".into()).unwrap();
        store
            .create_resource(&stored("2", "InCSE1", "0", ResourceType::CSE_BASE))
            .unwrap();
        store
            .create_resource(&stored("3", "cnt", "2", ResourceType::CONTAINER))
            .unwrap();
        store
            .create_resource(&stored("4", "cin", "3", ResourceType::CONTENT_INSTANCE))
            .unwrap();
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        let cache = Arc::new(Cache::new(Arc::clone(&dyn_store), &TreeConfig::default()));
        let reader = ResourceTreeReader::new(dyn_store, cache, Arc::new(NoRemoteCses));
        (store, reader)
    }

    #[test]
    fn retrieve_cse_by_name_or_id() {
        let (_store, reader) = seeded();
        assert_eq!(reader.retrieve_cse("InCSE1").unwrap().resource_id.as_str(), "2");
        assert_eq!(reader.retrieve_cse("2").unwrap().name, "InCSE1");
        assert!(reader.retrieve_cse("nope").is_none());
    }

    #[test]
    fn child_resource_join() {
        let (_store, reader) = seeded();
        let cnt = reader
            .retrieve_child_resource_by_name(&"2".into(), "cnt")
            .unwrap();
        assert_eq!(cnt.resource_id().as_str(), "3");
        assert_eq!(
            reader.retrieve_child_resource_id_by_name(&"3".into(), "cin"),
            Some("4".into())
        );
        assert!(reader.retrieve_child_resource_by_name(&"2".into(), "x").is_none());
    }

    #[test]
    fn large_content_is_reloaded() {
        let store = Arc::new(InMemoryStore::new());
        let big = format!("{{\"con\":\"{}\"}}", "x".repeat(64));
        let mut record = stored("2", "InCSE1", "0", ResourceType::CSE_BASE);
        record.content_json = big.clone();
        store.create_resource(&record).unwrap();
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        let config = TreeConfig::default().content_retain_threshold(16);
        let cache = Arc::new(Cache::new(Arc::clone(&dyn_store), &config));
        let reader = ResourceTreeReader::new(dyn_store, cache, Arc::new(NoRemoteCses));

        let elem = reader.retrieve_resource_by_id(&"2".into()).unwrap();
        assert!(elem.retained_content().is_none());
        assert_eq!(reader.resource_content_json(&elem).as_deref(), Some(big.as_str()));
        assert!(elem.retained_content().is_none());
    }

    #[test]
    fn entity_registration_sources() {
        let store = Arc::new(InMemoryStore::new());
        store.create_ae_id_mapping("InCSE1", "Cae1", &"5".into()).unwrap();
        store
            .create_remote_cse_mapping("InCSE1", "/mn-stored", &"6".into())
            .unwrap();
        let registry = Arc::new(InMemoryRemoteCseRegistry::new());
        registry.register("InCSE1", "/mn-live");
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        let cache = Arc::new(Cache::new(Arc::clone(&dyn_store), &TreeConfig::default()));
        let reader = ResourceTreeReader::new(dyn_store, cache, registry);

        assert!(reader.is_entity_registered("/mn-live", "InCSE1"));
        assert!(reader.is_entity_registered("Cae1", "InCSE1"));
        assert!(reader.is_entity_registered("/mn-stored", "InCSE1"));
        assert!(!reader.is_entity_registered("Cae2", "InCSE1"));
        assert!(!reader.is_entity_registered("Cae1", "InCSE2"));
    }

    #[test]
    fn hierarchy_snapshot_reads_store() {
        let (_store, reader) = seeded();
        let root = reader.hierarchy_snapshot(&"2".into()).unwrap();
        assert_eq!(root.len(), 3);
        assert_eq!(root.children[0].name, "cnt");
        assert_eq!(
            root.children[0].children[0].resource_type,
            ResourceType::CONTENT_INSTANCE
        );
        assert!(reader.hierarchy_snapshot(&"99".into()).is_none());
    }

    #[test]
    fn paging_limits() {
        let (store, reader) = seeded();
        for i in 0..5 {
            store
                .create_resource(&stored(&format!("1{i}"), &format!("c{i}"), "2", ResourceType::CONTAINER))
                .unwrap();
        }
        assert_eq!(reader.retrieve_parent_child_list(&"2".into()).len(), 6);
        assert_eq!(reader.retrieve_parent_child_list_limit_n(&"2".into(), 2).len(), 2);
        assert_eq!(reader.retrieve_parent_child_list_page(&"2".into(), 0, 4).len(), 2);
        assert!(reader.retrieve_parent_child_list(&"404".into()).is_empty());
    }
}
