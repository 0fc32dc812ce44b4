//! Multi-level resource cache.
//!
//! Four tables sit in front of the backing store:
//! - resources by id
//! - CSE records by name
//! - child maps (child name to edge) by parent id
//! - one AE-ID table per CSE, created on first use
//!
//! Lookups load through to the store on a miss. Multi-edge operations
//! (create, move, delete) are only atomic per table entry; callers serialize
//! structural changes to the same parent.

mod loading;
mod resource;

pub use loading::LoadingCache;
pub use resource::{ResourceElem, ResourceSnapshot};

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::stats::{CacheStatsSnapshot, TreeCacheStats};
use iotdm_store::{CseRecord, ParentChildEdge, ResourceId, ResourceStore, ResourceType};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error};

/// Child name to edge, shared between the cache and its readers.
pub type ChildMap = Arc<RwLock<BTreeMap<String, ParentChildEdge>>>;

/// The resource tree cache.
pub struct Cache {
    store: Arc<dyn ResourceStore>,
    resources: LoadingCache<ResourceId, Arc<ResourceElem>>,
    cses: LoadingCache<String, Arc<CseRecord>>,
    children: LoadingCache<ResourceId, ChildMap>,
    ae_ids: RwLock<HashMap<String, Arc<LoadingCache<String, ResourceId>>>>,
    ae_capacity: usize,
    retain_threshold: usize,
}

impl Cache {
    /// Creates an empty cache over `store`.
    pub fn new(store: Arc<dyn ResourceStore>, config: &TreeConfig) -> Self {
        Self {
            store,
            resources: LoadingCache::new("resources", config.resource_cache_capacity),
            cses: LoadingCache::new("cses", config.cse_cache_capacity),
            children: LoadingCache::new("children", config.child_cache_capacity),
            ae_ids: RwLock::new(HashMap::new()),
            ae_capacity: config.ae_cache_capacity,
            retain_threshold: config.content_retain_threshold,
        }
    }

    /// Content retain threshold in bytes.
    #[must_use]
    pub fn retain_threshold(&self) -> usize {
        self.retain_threshold
    }

    // === CSE table ===

    /// Caches a CSE record and allocates its AE-ID table. Overwrites.
    pub fn create_cse_by_name(&self, name: &str, resource_id: &ResourceId) {
        self.cses
            .put(name.to_owned(), Arc::new(CseRecord::new(name, resource_id.clone())));
        self.ae_table(name);
    }

    /// Looks up a CSE by name, loading through on a miss.
    pub fn retrieve_cse_by_name(&self, name: &str) -> Option<Arc<CseRecord>> {
        let store = &self.store;
        self.cses.get_or_load(&name.to_owned(), |key| {
            store.retrieve_cse_by_name(key).map(|found| found.map(Arc::new))
        })
    }

    // === Resource table ===

    /// Looks up a resource, loading through on a miss.
    pub fn retrieve_resource_by_id(&self, resource_id: &ResourceId) -> Option<Arc<ResourceElem>> {
        let store = &self.store;
        let threshold = self.retain_threshold;
        self.resources.get_or_load(resource_id, |key| {
            store
                .retrieve_resource_by_id(key)
                .map(|found| found.map(|r| Arc::new(ResourceElem::from_stored(&r, threshold))))
        })
    }

    /// Returns the cached resource without loading.
    pub fn cached_resource(&self, resource_id: &ResourceId) -> Option<Arc<ResourceElem>> {
        self.resources.get_if_present(resource_id)
    }

    /// Caches a newly created resource and links it under its parent.
    ///
    /// Chained child types start with empty oldest/latest pointers. Non-leaf
    /// resources get an empty child map. If the parent's child map cannot be
    /// obtained, the new entries are invalidated again and an error returned.
    pub fn create_resource(
        &self,
        resource_id: &ResourceId,
        name: &str,
        content_json: &str,
        parent_id: &ResourceId,
        resource_type: ResourceType,
        parent_target_uri: &str,
    ) -> TreeResult<Arc<ResourceElem>> {
        let elem = Arc::new(ResourceElem::new(
            resource_id.clone(),
            name,
            parent_id.clone(),
            resource_type,
            content_json,
            parent_target_uri,
            self.retain_threshold,
        ));
        if !resource_type.is_leaf() {
            for chained in ResourceType::CHAINED {
                elem.set_oldest_latest(chained, ResourceId::null(), ResourceId::null());
            }
        }
        self.resources.put(resource_id.clone(), Arc::clone(&elem));
        if !resource_type.is_leaf() {
            self.children
                .put(resource_id.clone(), Arc::new(RwLock::new(BTreeMap::new())));
        }

        if parent_id.is_null() {
            return Ok(elem);
        }

        match self.retrieve_child_map(parent_id) {
            Some(siblings) => {
                siblings
                    .write()
                    .insert(name.to_owned(), ParentChildEdge::new(name, resource_id.clone()));
                Ok(elem)
            }
            None => {
                self.resources.invalidate(resource_id);
                self.children.invalidate(resource_id);
                error!(
                    resource_id = %resource_id,
                    parent_id = %parent_id,
                    "no child map for parent, create rolled back in cache"
                );
                Err(TreeError::inconsistent(format!(
                    "parent {} of {} has no child map",
                    parent_id, resource_id
                )))
            }
        }
    }

    /// Replaces a cached resource's content. A miss only fences loads in
    /// flight.
    pub fn update_json_resource_content(&self, resource_id: &ResourceId, content_json: &str) {
        match self.resources.get_if_present(resource_id) {
            Some(elem) => elem.set_content(content_json, self.retain_threshold),
            None => {
                self.resources.invalidate(resource_id);
            }
        }
    }

    /// Updates a cached resource's chain heads. A miss only fences loads in
    /// flight.
    pub fn update_oldest_latest(
        &self,
        resource_id: &ResourceId,
        resource_type: ResourceType,
        oldest_id: &ResourceId,
        latest_id: &ResourceId,
    ) {
        match self.resources.get_if_present(resource_id) {
            Some(elem) => elem.set_oldest_latest(resource_type, oldest_id.clone(), latest_id.clone()),
            None => {
                self.resources.invalidate(resource_id);
            }
        }
    }

    // === Child map table ===

    /// Returns the child map of `parent_id`, loading through on a miss.
    pub fn retrieve_child_map(&self, parent_id: &ResourceId) -> Option<ChildMap> {
        let store = &self.store;
        self.children.get_or_load(parent_id, |key| {
            store.retrieve_parent_child_list(key).map(|found| {
                found.map(|edges| {
                    let map: BTreeMap<String, ParentChildEdge> =
                        edges.into_iter().map(|e| (e.name.clone(), e)).collect();
                    Arc::new(RwLock::new(map))
                })
            })
        })
    }

    /// Looks up one edge under `parent_id`.
    pub fn retrieve_child_by_name(&self, parent_id: &ResourceId, name: &str) -> Option<ParentChildEdge> {
        self.retrieve_child_map(parent_id)
            .and_then(|map| map.read().get(name).cloned())
    }

    /// Returns a page of `parent_id`'s children in child map order.
    ///
    /// A negative `offset` is treated as 0 and `limit <= 0` means no limit.
    /// Returns `None` if the parent has no child map.
    pub fn retrieve_parent_child_list(
        &self,
        parent_id: &ResourceId,
        limit: i64,
        offset: i64,
    ) -> Option<Vec<ParentChildEdge>> {
        let map = self.retrieve_child_map(parent_id)?;
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = if limit <= 0 {
            usize::MAX
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };
        let page = map.read().values().skip(skip).take(take).cloned().collect();
        Some(page)
    }

    /// Writes (or overwrites) an edge under `parent_id`.
    pub fn create_parent_child_link(&self, parent_id: &ResourceId, edge: &ParentChildEdge) -> TreeResult<()> {
        let map = self.child_map_or_err(parent_id)?;
        map.write().insert(edge.name.clone(), edge.clone());
        Ok(())
    }

    /// Sets the `next` pointer of the named edge.
    pub fn update_child_sibling_next(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        next_id: &ResourceId,
    ) -> TreeResult<()> {
        let map = self.child_map_or_err(parent_id)?;
        let mut edges = map.write();
        let edge = edges
            .get_mut(child_name)
            .ok_or_else(|| TreeError::not_found("child", format!("{}/{}", parent_id, child_name)))?;
        edge.next_id = next_id.clone();
        Ok(())
    }

    /// Sets the `prev` pointer of the named edge.
    pub fn update_child_sibling_prev(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        prev_id: &ResourceId,
    ) -> TreeResult<()> {
        let map = self.child_map_or_err(parent_id)?;
        let mut edges = map.write();
        let edge = edges
            .get_mut(child_name)
            .ok_or_else(|| TreeError::not_found("child", format!("{}/{}", parent_id, child_name)))?;
        edge.prev_id = prev_id.clone();
        Ok(())
    }

    /// Removes the named edge.
    pub fn remove_parent_child_link(&self, parent_id: &ResourceId, child_name: &str) -> TreeResult<()> {
        let map = self.child_map_or_err(parent_id)?;
        let removed = map.write().remove(child_name);
        removed
            .map(|_| ())
            .ok_or_else(|| TreeError::not_found("child", format!("{}/{}", parent_id, child_name)))
    }

    /// Moves the named edge from `old_parent_id` to `new_parent_id`, storing
    /// it as `new_child_name`.
    ///
    /// Both child maps are locked for the move. If either map is missing or
    /// the edge does not exist, nothing changes.
    pub fn move_parent_child_link(
        &self,
        resource_id: &ResourceId,
        child_name: &str,
        old_parent_id: &ResourceId,
        new_parent_id: &ResourceId,
        new_child_name: &str,
    ) -> TreeResult<()> {
        let old_map = self.child_map_or_err(old_parent_id)?;
        let new_map = self.child_map_or_err(new_parent_id)?;
        let missing =
            || TreeError::not_found("child", format!("{}/{}", old_parent_id, child_name));

        if Arc::ptr_eq(&old_map, &new_map) {
            let mut edges = old_map.write();
            let mut edge = edges.remove(child_name).ok_or_else(missing)?;
            edge.name = new_child_name.to_owned();
            edges.insert(edge.name.clone(), edge);
        } else {
            // Lock in address order so two opposite moves cannot deadlock.
            let old_first = Arc::as_ptr(&old_map) < Arc::as_ptr(&new_map);
            let (mut old_edges, mut new_edges) = if old_first {
                let o = old_map.write();
                (o, new_map.write())
            } else {
                let n = new_map.write();
                (old_map.write(), n)
            };
            let mut edge = old_edges.remove(child_name).ok_or_else(missing)?;
            edge.name = new_child_name.to_owned();
            new_edges.insert(edge.name.clone(), edge);
        }
        debug!(
            resource_id = %resource_id,
            from = %old_parent_id,
            to = %new_parent_id,
            "moved parent-child link"
        );
        Ok(())
    }

    /// Drops a parent's child map so the next access reloads it.
    pub fn invalidate_child_map(&self, parent_id: &ResourceId) {
        self.children.invalidate(parent_id);
    }

    fn child_map_or_err(&self, parent_id: &ResourceId) -> TreeResult<ChildMap> {
        self.retrieve_child_map(parent_id).ok_or_else(|| {
            error!(parent_id = %parent_id, "no child map for parent");
            TreeError::inconsistent(format!("parent {} has no child map", parent_id))
        })
    }

    // === Deletion ===

    /// Drops a resource and every cached descendant.
    ///
    /// The edge under `parent_id` is removed if the parent's map is cached;
    /// otherwise a load of that map already in flight is not memoized.
    /// Descendants are invalidated before the resource's own child map.
    pub fn delete_resource(&self, resource_id: &ResourceId, name: &str, parent_id: &ResourceId) {
        if !parent_id.is_null() {
            match self.children.get_if_present(parent_id) {
                Some(siblings) => {
                    siblings.write().remove(name);
                }
                // Keeps a concurrent load of the parent from memoizing the edge.
                None => {
                    self.children.invalidate(parent_id);
                }
            }
        }
        self.resources.invalidate(resource_id);
        self.invalidate_subtree(resource_id);
    }

    fn invalidate_subtree(&self, resource_id: &ResourceId) {
        if let Some(map) = self.children.get_if_present(resource_id) {
            let child_ids: Vec<ResourceId> =
                map.read().values().map(|e| e.resource_id.clone()).collect();
            for child_id in &child_ids {
                self.resources.invalidate(child_id);
                self.invalidate_subtree(child_id);
            }
        }
        self.children.invalidate(resource_id);
    }

    /// Clears every table.
    pub fn re_initialize(&self) {
        self.resources.invalidate_all();
        self.cses.invalidate_all();
        self.children.invalidate_all();
        self.ae_ids.write().clear();
        debug!("cache cleared");
    }

    // === AE-ID tables ===

    fn ae_table(&self, cse_name: &str) -> Arc<LoadingCache<String, ResourceId>> {
        if let Some(table) = self.ae_ids.read().get(cse_name) {
            return Arc::clone(table);
        }
        let mut tables = self.ae_ids.write();
        Arc::clone(
            tables
                .entry(cse_name.to_owned())
                .or_insert_with(|| Arc::new(LoadingCache::new("ae_ids", self.ae_capacity))),
        )
    }

    /// Resolves an AE-ID under `cse_name`, loading through on a miss.
    pub fn retrieve_ae_resource_id(&self, cse_name: &str, ae_id: &str) -> Option<ResourceId> {
        let store = &self.store;
        self.ae_table(cse_name).get_or_load(&ae_id.to_owned(), |key| {
            store.retrieve_ae_resource_id_by_ae_id(cse_name, key)
        })
    }

    /// Drops an AE-ID mapping from the cache.
    pub fn invalidate_ae_id(&self, cse_name: &str, ae_id: &str) {
        if let Some(table) = self.ae_ids.read().get(cse_name) {
            table.invalidate(&ae_id.to_owned());
        }
    }

    // === Statistics ===

    /// Returns counters for every table.
    pub fn stats(&self) -> TreeCacheStats {
        let ae_ids = self
            .ae_ids
            .read()
            .values()
            .map(|t| t.stats())
            .fold(CacheStatsSnapshot::default(), |acc, s| acc + s);
        TreeCacheStats {
            resources: self.resources.stats(),
            cses: self.cses.stats(),
            children: self.children.stats(),
            ae_ids,
            resource_entries: self.resources.len(),
            child_entries: self.children.len(),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("resources", &self.resources.len())
            .field("cses", &self.cses.len())
            .field("children", &self.children.len())
            .field("ae_tables", &self.ae_ids.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotdm_store::{InMemoryStore, StoredResource};

    fn setup() -> (Arc<InMemoryStore>, Cache) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Cache::new(store.clone(), &TreeConfig::default());
        (store, cache)
    }

    fn root(cache: &Cache) -> ResourceId {
        let id: ResourceId = "2".into();
        cache
            .create_resource(&id, "cse", "{}", &ResourceId::null(), ResourceType::CSE_BASE, "")
            .unwrap();
        id
    }

    #[test]
    fn create_and_lookup() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let cnt: ResourceId = "3".into();
        cache
            .create_resource(&cnt, "cnt", "{}", &cse, ResourceType::CONTAINER, "/cse")
            .unwrap();

        let elem = cache.retrieve_resource_by_id(&cnt).unwrap();
        assert_eq!(elem.name(), "cnt");
        assert_eq!(elem.parent_id(), &cse);
        let edge = cache.retrieve_child_by_name(&cse, "cnt").unwrap();
        assert_eq!(edge.resource_id, cnt);
        assert!(elem.oldest_latest(ResourceType::CONTENT_INSTANCE).unwrap().is_empty());
    }

    #[test]
    fn create_under_missing_parent_rolls_back() {
        let (_store, cache) = setup();
        let id: ResourceId = "3".into();
        let result = cache.create_resource(&id, "x", "{}", &"99".into(), ResourceType::CONTAINER, "");
        assert!(matches!(result, Err(TreeError::Inconsistent { .. })));
        assert!(cache.cached_resource(&id).is_none());
        assert!(cache.retrieve_child_map(&id).is_none());
    }

    #[test]
    fn leaf_has_no_child_map() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let cin: ResourceId = "3".into();
        cache
            .create_resource(&cin, "cin", "{}", &cse, ResourceType::CONTENT_INSTANCE, "")
            .unwrap();
        assert!(cache.retrieve_parent_child_list(&cin, 0, 0).is_none());
    }

    #[test]
    fn load_through_from_store() {
        let (store, cache) = setup();
        store
            .create_resource(&StoredResource {
                resource_id: "7".into(),
                name: "seeded".into(),
                parent_id: ResourceId::null(),
                resource_type: ResourceType::CSE_BASE,
                content_json: "{}".into(),
                parent_target_uri: String::new(),
                oldest_latest: Vec::new(),
            })
            .unwrap();

        assert!(cache.retrieve_resource_by_id(&"7".into()).is_some());
        assert!(cache.retrieve_resource_by_id(&"7".into()).is_some());
        assert_eq!(store.access_counts().resource_reads, 1);
    }

    #[test]
    fn pagination() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        for i in 0..5 {
            let id = ResourceId::new((10 + i).to_string());
            cache
                .create_resource(&id, &format!("c{i}"), "{}", &cse, ResourceType::CONTAINER, "")
                .unwrap();
        }
        let names = |v: Vec<ParentChildEdge>| v.into_iter().map(|e| e.name).collect::<Vec<_>>();

        assert_eq!(cache.retrieve_parent_child_list(&cse, 0, 0).unwrap().len(), 5);
        assert_eq!(cache.retrieve_parent_child_list(&cse, -3, -1).unwrap().len(), 5);
        assert_eq!(
            names(cache.retrieve_parent_child_list(&cse, 2, 1).unwrap()),
            vec!["c1", "c2"]
        );
        assert!(cache.retrieve_parent_child_list(&cse, 2, 9).unwrap().is_empty());
    }

    #[test]
    fn move_link_between_parents() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let a: ResourceId = "3".into();
        let b: ResourceId = "4".into();
        cache.create_resource(&a, "a", "{}", &cse, ResourceType::CONTAINER, "").unwrap();
        cache.create_resource(&b, "b", "{}", &a, ResourceType::CONTAINER, "").unwrap();

        cache.move_parent_child_link(&b, "b", &a, &cse, "b").unwrap();
        assert!(cache.retrieve_child_by_name(&a, "b").is_none());
        assert_eq!(cache.retrieve_child_by_name(&cse, "b").unwrap().resource_id, b);
    }

    #[test]
    fn move_link_from_missing_parent_leaves_target() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let before = cache.retrieve_parent_child_list(&cse, 0, 0).unwrap();

        let result = cache.move_parent_child_link(&"3".into(), "x", &"404".into(), &cse, "x");
        assert!(result.is_err());
        assert_eq!(cache.retrieve_parent_child_list(&cse, 0, 0).unwrap(), before);
    }

    #[test]
    fn move_link_missing_child_fails() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let a: ResourceId = "3".into();
        cache.create_resource(&a, "a", "{}", &cse, ResourceType::CONTAINER, "").unwrap();
        assert!(cache.move_parent_child_link(&"9".into(), "ghost", &a, &cse, "ghost").is_err());
        assert!(cache.retrieve_child_by_name(&cse, "ghost").is_none());
    }

    #[test]
    fn sibling_updates_need_edge() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let a: ResourceId = "3".into();
        cache.create_resource(&a, "a", "{}", &cse, ResourceType::CONTENT_INSTANCE, "").unwrap();

        cache.update_child_sibling_next(&cse, "a", &"8".into()).unwrap();
        cache.update_child_sibling_prev(&cse, "a", &"6".into()).unwrap();
        let edge = cache.retrieve_child_by_name(&cse, "a").unwrap();
        assert_eq!(edge.next_id.as_str(), "8");
        assert_eq!(edge.prev_id.as_str(), "6");
        assert!(cache.update_child_sibling_next(&cse, "zz", &"8".into()).is_err());
    }

    #[test]
    fn update_content_miss_is_noop() {
        let (_store, cache) = setup();
        cache.update_json_resource_content(&"42".into(), "{}");
        assert!(cache.cached_resource(&"42".into()).is_none());
    }

    #[test]
    fn delete_cascades() {
        let (_store, cache) = setup();
        let cse = root(&cache);
        let a: ResourceId = "3".into();
        let b: ResourceId = "4".into();
        let c: ResourceId = "5".into();
        cache.create_resource(&a, "a", "{}", &cse, ResourceType::CONTAINER, "").unwrap();
        cache.create_resource(&b, "b", "{}", &a, ResourceType::CONTAINER, "").unwrap();
        cache.create_resource(&c, "c", "{}", &b, ResourceType::CONTENT_INSTANCE, "").unwrap();

        cache.delete_resource(&a, "a", &cse);

        // Store has nothing either, so lookups stay empty.
        assert!(cache.retrieve_resource_by_id(&a).is_none());
        assert!(cache.retrieve_resource_by_id(&b).is_none());
        assert!(cache.retrieve_resource_by_id(&c).is_none());
        assert!(cache.retrieve_child_by_name(&cse, "a").is_none());
    }

    #[test]
    fn cse_and_ae_tables() {
        let (store, cache) = setup();
        cache.create_cse_by_name("InCSE1", &"2".into());
        assert_eq!(cache.retrieve_cse_by_name("InCSE1").unwrap().resource_id.as_str(), "2");
        assert_eq!(store.access_counts().cse_reads, 0);

        store.create_ae_id_mapping("InCSE1", "Cae1", &"9".into()).unwrap();
        assert_eq!(cache.retrieve_ae_resource_id("InCSE1", "Cae1"), Some("9".into()));
        store.delete_ae_id_mapping("InCSE1", "Cae1").unwrap();
        // Still cached until invalidated.
        assert_eq!(cache.retrieve_ae_resource_id("InCSE1", "Cae1"), Some("9".into()));
        cache.invalidate_ae_id("InCSE1", "Cae1");
        assert_eq!(cache.retrieve_ae_resource_id("InCSE1", "Cae1"), None);
    }

    #[test]
    fn re_initialize_clears_everything() {
        let (_store, cache) = setup();
        root(&cache);
        cache.create_cse_by_name("cse", &"2".into());
        cache.re_initialize();
        let stats = cache.stats();
        assert_eq!(stats.resource_entries, 0);
        assert_eq!(stats.child_entries, 0);
    }
}
