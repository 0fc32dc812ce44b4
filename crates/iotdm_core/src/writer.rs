//! Structural mutations of the resource tree.
//!
//! Every operation writes the backing store first and mirrors the change
//! into the cache only after the store accepted it. A store failure leaves
//! the cache untouched. A cache failure after a successful store write is
//! logged; the store is not rolled back and the next cache load re-derives
//! the truth.

use crate::cache::{ResourceElem, ResourceSnapshot};
use crate::config::SiblingUnlink;
use crate::context::TreeContext;
use crate::error::{TreeError, TreeResult};
use crate::notifier::OperationKind;
use crate::request::ResourceRequest;
use iotdm_store::{
    OldestLatest, ParentChildEdge, ResourceId, ResourceType, StoreResult, StoredResource,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Name of the distinguished delete-root resource.
pub const DELETE_ROOT_NAME: &str = "sys-delete";

/// Stateless write facade. Cheap to create; all state lives in the shared
/// [`TreeContext`].
#[derive(Debug, Clone)]
pub struct ResourceTreeWriter {
    context: Arc<TreeContext>,
}

impl ResourceTreeWriter {
    /// Creates a writer over `context`.
    pub fn new(context: Arc<TreeContext>) -> Self {
        Self { context }
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<TreeContext> {
        &self.context
    }

    fn stored<T>(&self, op: &'static str, result: StoreResult<T>) -> TreeResult<T> {
        result.map_err(|e| {
            error!(op, error = %e, "store write failed");
            TreeError::from(e)
        })
    }

    fn mirrored(&self, op: &'static str, result: TreeResult<()>) -> TreeResult<()> {
        result.map_err(|e| {
            error!(op, error = %e, "cache update failed after store write");
            e
        })
    }

    // === Transactions ===

    /// Opens a store batch.
    pub fn start_write_transaction(&self) -> TreeResult<()> {
        self.stored("begin_batch", self.context.store().begin_batch())
    }

    /// Commits the current store batch.
    pub fn end_write_transaction(&self) -> TreeResult<()> {
        self.stored("commit_batch", self.context.store().commit_batch())
    }

    // === Creation ===

    /// Allocates a fresh resource id from the store.
    pub fn generate_resource_id(&self) -> TreeResult<ResourceId> {
        self.stored("next_resource_id", self.context.store().next_resource_id())
    }

    /// Registers a CSE name.
    pub fn create_cse_by_name(&self, name: &str, resource_id: &ResourceId) -> TreeResult<()> {
        self.stored(
            "create_cse_by_name",
            self.context.store().create_cse_by_name(name, resource_id),
        )?;
        self.context.cache().create_cse_by_name(name, resource_id);
        Ok(())
    }

    /// Creates a resource and its edge under the parent.
    ///
    /// The resource is not appended to any sibling chain; see
    /// [`ResourceTreeWriter::initialize_element_in_parent_list`].
    pub fn create_resource(&self, request: &impl ResourceRequest) -> TreeResult<Arc<ResourceElem>> {
        let resource_type = request.resource_type();
        let oldest_latest = if resource_type.is_leaf() {
            Vec::new()
        } else {
            ResourceType::CHAINED
                .iter()
                .map(|ty| OldestLatest::empty(*ty))
                .collect()
        };
        let record = StoredResource {
            resource_id: request.resource_id().clone(),
            name: request.name().to_owned(),
            parent_id: request.parent_id().clone(),
            resource_type,
            content_json: request.content_json().to_owned(),
            parent_target_uri: request.parent_target_uri().to_owned(),
            oldest_latest,
        };
        self.stored("create_resource", self.context.store().create_resource(&record))?;

        let elem = self
            .context
            .cache()
            .create_resource(
                &record.resource_id,
                &record.name,
                &record.content_json,
                &record.parent_id,
                resource_type,
                &record.parent_target_uri,
            )
            .map_err(|e| {
                error!(resource_id = %record.resource_id, error = %e, "cache create failed after store write");
                e
            })?;
        self.context
            .notifier()
            .enqueue(OperationKind::Create, &record.resource_id);
        Ok(elem)
    }

    /// Creates the delete-root resource if the store does not have it.
    pub fn ensure_delete_root(&self) -> TreeResult<()> {
        let root = ResourceId::delete_root();
        let existing = self.stored(
            "retrieve_resource_by_id",
            self.context.store().retrieve_resource_by_id(&root),
        )?;
        if existing.is_some() {
            return Ok(());
        }
        let record = StoredResource {
            resource_id: root.clone(),
            name: DELETE_ROOT_NAME.to_owned(),
            parent_id: ResourceId::null(),
            resource_type: ResourceType::SYSTEM,
            content_json: "{}".to_owned(),
            parent_target_uri: String::new(),
            oldest_latest: Vec::new(),
        };
        self.stored("create_resource", self.context.store().create_resource(&record))?;
        self.context.cache().create_resource(
            &root,
            DELETE_ROOT_NAME,
            "{}",
            &ResourceId::null(),
            ResourceType::SYSTEM,
            "",
        )?;
        debug!("created delete root");
        Ok(())
    }

    // === Updates ===

    /// Sets the head and tail of a typed sibling chain.
    pub fn update_resource_oldest_latest_info(
        &self,
        resource_id: &ResourceId,
        resource_type: ResourceType,
        oldest_id: &ResourceId,
        latest_id: &ResourceId,
    ) -> TreeResult<()> {
        self.stored(
            "update_oldest_latest",
            self.context
                .store()
                .update_oldest_latest(resource_id, resource_type, oldest_id, latest_id),
        )?;
        self.context
            .cache()
            .update_oldest_latest(resource_id, resource_type, oldest_id, latest_id);
        Ok(())
    }

    /// Replaces a resource's serialized content.
    pub fn update_json_resource_content_string(
        &self,
        resource_id: &ResourceId,
        content_json: &str,
    ) -> TreeResult<()> {
        self.stored(
            "update_json_resource_content",
            self.context
                .store()
                .update_json_resource_content(resource_id, content_json),
        )?;
        self.context
            .cache()
            .update_json_resource_content(resource_id, content_json);
        self.context
            .notifier()
            .enqueue(OperationKind::Update, resource_id);
        Ok(())
    }

    // === Edges ===

    /// Writes (or overwrites) an edge under `parent_id`.
    pub fn create_parent_child_link(&self, parent_id: &ResourceId, edge: &ParentChildEdge) -> TreeResult<()> {
        self.stored(
            "create_parent_child_link",
            self.context.store().create_parent_child_link(parent_id, edge),
        )?;
        self.mirrored(
            "create_parent_child_link",
            self.context.cache().create_parent_child_link(parent_id, edge),
        )
    }

    /// Removes the named edge under `parent_id`.
    ///
    /// An edge the store no longer has counts as removed: only the cached
    /// copy is dropped.
    pub fn remove_parent_child_link(&self, parent_id: &ResourceId, child_name: &str) -> TreeResult<()> {
        match self.context.store().remove_parent_child_link(parent_id, child_name) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(parent_id = %parent_id, child_name, "edge already gone from store");
            }
            Err(e) => return self.stored("remove_parent_child_link", Err(e)),
        }
        if let Err(e) = self
            .context
            .cache()
            .remove_parent_child_link(parent_id, child_name)
        {
            warn!(parent_id = %parent_id, child_name, error = %e, "dropping cached child map");
            self.context.cache().invalidate_child_map(parent_id);
        }
        Ok(())
    }

    /// Sets the `next` pointer of a child edge.
    pub fn update_child_sibling_next_info(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        next_id: &ResourceId,
    ) -> TreeResult<()> {
        self.stored(
            "update_child_sibling_next",
            self.context
                .store()
                .update_child_sibling_next(parent_id, child_name, next_id),
        )?;
        self.mirrored(
            "update_child_sibling_next",
            self.context
                .cache()
                .update_child_sibling_next(parent_id, child_name, next_id),
        )
    }

    /// Sets the `prev` pointer of a child edge.
    pub fn update_child_sibling_prev_info(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        prev_id: &ResourceId,
    ) -> TreeResult<()> {
        self.stored(
            "update_child_sibling_prev",
            self.context
                .store()
                .update_child_sibling_prev(parent_id, child_name, prev_id),
        )?;
        self.mirrored(
            "update_child_sibling_prev",
            self.context
                .cache()
                .update_child_sibling_prev(parent_id, child_name, prev_id),
        )
    }

    // === Sibling chains ===

    /// Resolves the edge of `resource_id` under `parent_id` through the
    /// resource's name.
    fn sibling_edge(&self, parent_id: &ResourceId, resource_id: &ResourceId) -> TreeResult<ParentChildEdge> {
        let reader = self.context.reader();
        let elem = reader
            .retrieve_resource_by_id(resource_id)
            .ok_or_else(|| TreeError::not_found("resource", resource_id.as_str()))?;
        reader
            .retrieve_child_by_name(parent_id, elem.name())
            .ok_or_else(|| TreeError::not_found("child", format!("{}/{}", parent_id, elem.name())))
    }

    fn own_edge(&self, parent_id: &ResourceId, name: &str) -> TreeResult<ParentChildEdge> {
        self.context
            .reader()
            .retrieve_child_by_name(parent_id, name)
            .ok_or_else(|| TreeError::not_found("child", format!("{}/{}", parent_id, name)))
    }

    /// Appends a typed child to the end of its sibling chain and writes its
    /// edge with the computed pointers.
    pub fn initialize_element_in_parent_list(
        &self,
        resource_type: ResourceType,
        parent_id: &ResourceId,
        resource_id: &ResourceId,
        name: &str,
    ) -> TreeResult<()> {
        let current = self
            .context
            .reader()
            .retrieve_oldest_latest_by_resource_type(parent_id, resource_type)
            .unwrap_or_else(|| OldestLatest::empty(resource_type));

        let prev_id = if current.is_empty() {
            self.update_resource_oldest_latest_info(parent_id, resource_type, resource_id, resource_id)?;
            ResourceId::null()
        } else {
            let latest_edge = self.sibling_edge(parent_id, &current.latest_id)?;
            self.update_resource_oldest_latest_info(
                parent_id,
                resource_type,
                &current.oldest_id,
                resource_id,
            )?;
            self.update_child_sibling_next_info(parent_id, &latest_edge.name, resource_id)?;
            current.latest_id
        };

        let edge = ParentChildEdge::new(name, resource_id.clone()).with_siblings(prev_id, ResourceId::null());
        self.create_parent_child_link(parent_id, &edge)
    }

    /// Unlinks a typed child from its sibling chain.
    ///
    /// Removing the only child resets the chain to empty. Removing the
    /// latest or oldest moves the tail or head to the neighbour. Removing a
    /// middle element rewires both neighbours according to the configured
    /// [`SiblingUnlink`] policy. The child's own edge is left as it is.
    pub fn delete_resource_in_references(
        &self,
        parent_id: &ResourceId,
        resource_type: ResourceType,
        this_id: &ResourceId,
        this_name: &str,
    ) -> TreeResult<()> {
        let Some(current) = self
            .context
            .reader()
            .retrieve_oldest_latest_by_resource_type(parent_id, resource_type)
        else {
            return Ok(());
        };

        if current.oldest_id == *this_id && current.latest_id == *this_id {
            let null = ResourceId::null();
            return self.update_resource_oldest_latest_info(parent_id, resource_type, &null, &null);
        }

        let this_edge = self.own_edge(parent_id, this_name)?;

        if current.latest_id == *this_id {
            let prev_edge = self.sibling_edge(parent_id, &this_edge.prev_id)?;
            self.update_resource_oldest_latest_info(
                parent_id,
                resource_type,
                &current.oldest_id,
                &this_edge.prev_id,
            )?;
            return self.update_child_sibling_next_info(parent_id, &prev_edge.name, &ResourceId::null());
        }

        if current.oldest_id == *this_id {
            let next_edge = self.sibling_edge(parent_id, &this_edge.next_id)?;
            self.update_resource_oldest_latest_info(
                parent_id,
                resource_type,
                &this_edge.next_id,
                &current.latest_id,
            )?;
            return self.update_child_sibling_prev_info(parent_id, &next_edge.name, &ResourceId::null());
        }

        let prev_edge = if this_edge.prev_id.is_null() {
            None
        } else {
            Some(self.sibling_edge(parent_id, &this_edge.prev_id)?)
        };
        let next_edge = if this_edge.next_id.is_null() {
            None
        } else {
            Some(self.sibling_edge(parent_id, &this_edge.next_id)?)
        };

        let (new_next, new_prev) = match self.context.config().sibling_unlink {
            SiblingUnlink::Detach => (ResourceId::null(), ResourceId::null()),
            SiblingUnlink::Splice => (this_edge.next_id.clone(), this_edge.prev_id.clone()),
        };
        if let Some(prev_edge) = prev_edge {
            self.update_child_sibling_next_info(parent_id, &prev_edge.name, &new_next)?;
        }
        if let Some(next_edge) = next_edge {
            self.update_child_sibling_prev_info(parent_id, &next_edge.name, &new_prev)?;
        }
        Ok(())
    }

    // === Deletion ===

    /// Deletes one resource record, its child list and its edge under
    /// `parent_id`, then drops it and its cached descendants from the cache.
    pub fn delete_resource_by_id(
        &self,
        resource_id: &ResourceId,
        parent_id: &ResourceId,
        name: &str,
    ) -> TreeResult<()> {
        self.stored(
            "delete_resource",
            self.context.store().delete_resource(resource_id, parent_id, name),
        )?;
        self.context.cache().delete_resource(resource_id, name, parent_id);
        self.context
            .notifier()
            .enqueue(OperationKind::Delete, resource_id);
        Ok(())
    }

    /// Deletes the subtree described by `snapshot`.
    ///
    /// The resource is first unlinked from its sibling chain if it is still
    /// linked under the snapshot's parent. Descendants are deleted bottom-up
    /// before the resource itself. Fails with `NotFound` if the resource no
    /// longer exists.
    pub fn delete_resource_tree(&self, snapshot: &ResourceSnapshot) -> TreeResult<()> {
        let resource_id = &snapshot.resource_id;
        let existing = self.stored(
            "retrieve_resource_by_id",
            self.context.store().retrieve_resource_by_id(resource_id),
        )?;
        if existing.is_none() {
            return Err(TreeError::not_found("resource", resource_id.as_str()));
        }

        let (parent_id, name) = self.live_link(snapshot);
        if parent_id == snapshot.parent_id && snapshot.resource_type.is_chained() {
            self.delete_resource_in_references(
                &parent_id,
                snapshot.resource_type,
                resource_id,
                &snapshot.name,
            )?;
        }

        for (child_parent, edge) in self.descendants_bottom_up(resource_id)? {
            self.delete_resource_by_id(&edge.resource_id, &child_parent, &edge.name)?;
        }
        self.delete_resource_by_id(resource_id, &parent_id, &name)
    }

    /// Where the snapshot's resource is linked now: under its recorded
    /// parent, under the delete root, or nowhere (null parent).
    fn live_link(&self, snapshot: &ResourceSnapshot) -> (ResourceId, String) {
        let reader = self.context.reader();
        let id = &snapshot.resource_id;
        if !snapshot.parent_id.is_null() {
            if let Some(edge) = reader.retrieve_child_by_name(&snapshot.parent_id, &snapshot.name) {
                if edge.resource_id == *id {
                    return (snapshot.parent_id.clone(), snapshot.name.clone());
                }
            }
        }
        let delete_root = ResourceId::delete_root();
        if let Some(edge) = reader.retrieve_child_by_name(&delete_root, id.as_str()) {
            if edge.resource_id == *id {
                return (delete_root, id.as_str().to_owned());
            }
        }
        (ResourceId::null(), snapshot.name.clone())
    }

    /// Every (parent, edge) below `root`, each listed after all of its own
    /// descendants.
    fn descendants_bottom_up(&self, root: &ResourceId) -> TreeResult<Vec<(ResourceId, ParentChildEdge)>> {
        let store = self.context.store();
        let mut order = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(parent) = pending.pop() {
            let edges = self
                .stored("retrieve_parent_child_list", store.retrieve_parent_child_list(&parent))?
                .unwrap_or_default();
            for edge in edges {
                pending.push(edge.resource_id.clone());
                order.push((parent.clone(), edge));
            }
        }
        order.reverse();
        Ok(order)
    }

    /// Relocates a resource's edge under the delete root, keyed by the
    /// resource id.
    ///
    /// Chained resources are unlinked from their sibling chain first. The
    /// resource record keeps its original parent id.
    pub fn move_parent_child_link_to_delete_parent(&self, resource_id: &ResourceId) -> TreeResult<()> {
        let delete_root = ResourceId::delete_root();
        if *resource_id == delete_root {
            return Err(TreeError::invalid_operation("cannot relocate the delete root"));
        }
        let elem = self
            .context
            .reader()
            .retrieve_resource_by_id(resource_id)
            .ok_or_else(|| TreeError::not_found("resource", resource_id.as_str()))?;
        let parent_id = elem.parent_id().clone();
        if parent_id.is_null() {
            return Err(TreeError::invalid_operation(format!(
                "cannot relocate root resource {}",
                resource_id
            )));
        }
        let edge = self.own_edge(&parent_id, elem.name())?;
        if edge.resource_id != *resource_id {
            return Err(TreeError::not_found(
                "child",
                format!("{}/{}", parent_id, elem.name()),
            ));
        }

        if elem.resource_type().is_chained() {
            self.delete_resource_in_references(&parent_id, elem.resource_type(), resource_id, elem.name())?;
        }

        self.stored(
            "move_parent_child_link",
            self.context.store().move_parent_child_link(
                elem.name(),
                &parent_id,
                &delete_root,
                resource_id.as_str(),
            ),
        )?;
        if let Err(e) = self.context.cache().move_parent_child_link(
            resource_id,
            elem.name(),
            &parent_id,
            &delete_root,
            resource_id.as_str(),
        ) {
            warn!(resource_id = %resource_id, error = %e, "dropping cached child maps after relocation");
            self.context.cache().invalidate_child_map(&parent_id);
            self.context.cache().invalidate_child_map(&delete_root);
        }
        debug!(resource_id = %resource_id, from = %parent_id, "relocated under delete root");
        Ok(())
    }

    // === Registration tables (uncached) ===

    /// Records an AE-ID registration. Written to the store only.
    pub fn create_ae_under_cse(&self, cse_name: &str, ae_id: &str, resource_id: &ResourceId) -> TreeResult<()> {
        self.stored(
            "create_ae_id_mapping",
            self.context
                .store()
                .create_ae_id_mapping(cse_name, ae_id, resource_id),
        )
    }

    /// Removes an AE-ID registration and any cached copy of it.
    pub fn delete_ae_id_to_resource_id_mapping(&self, cse_name: &str, ae_id: &str) -> TreeResult<()> {
        self.stored(
            "delete_ae_id_mapping",
            self.context.store().delete_ae_id_mapping(cse_name, ae_id),
        )?;
        self.context.cache().invalidate_ae_id(cse_name, ae_id);
        Ok(())
    }

    /// Records a remote-CSE registration. Written to the store only.
    pub fn create_remote_cse_under_cse(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
        resource_id: &ResourceId,
    ) -> TreeResult<()> {
        self.stored(
            "create_remote_cse_mapping",
            self.context
                .store()
                .create_remote_cse_mapping(cse_name, remote_cse_id, resource_id),
        )
    }

    /// Removes a remote-CSE registration.
    pub fn delete_remote_cse_id_to_resource_id_mapping(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
    ) -> TreeResult<()> {
        self.stored(
            "delete_remote_cse_mapping",
            self.context
                .store()
                .delete_remote_cse_mapping(cse_name, remote_cse_id),
        )
    }

    // === Reset ===

    /// Wipes the store and every cache table, then recreates the delete
    /// root.
    pub fn re_initialize_datastore(&self) -> TreeResult<()> {
        self.stored("re_initialize", self.context.store().re_initialize())?;
        self.context.cache().re_initialize();
        self.ensure_delete_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::TreeConfig;
    use crate::notifier::{DbNotifier, MemoryChangeLog};
    use crate::reader::ResourceTreeReader;
    use crate::remote_cse::NoRemoteCses;
    use crate::request::NewResource;
    use iotdm_store::{InMemoryStore, ResourceStore};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        log: Arc<MemoryChangeLog>,
        writer: ResourceTreeWriter,
    }

    fn fixture(config: TreeConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        let cache = Arc::new(Cache::new(Arc::clone(&dyn_store), &config));
        let reader = Arc::new(ResourceTreeReader::new(
            Arc::clone(&dyn_store),
            Arc::clone(&cache),
            Arc::new(NoRemoteCses),
        ));
        let log = Arc::new(MemoryChangeLog::new());
        let notifier = Arc::new(DbNotifier::new(log.clone(), 20, Duration::from_millis(10)));
        let context = Arc::new(TreeContext::new(dyn_store, cache, reader, notifier, config));
        let writer = ResourceTreeWriter::new(context);
        writer.ensure_delete_root().unwrap();
        Fixture { store, log, writer }
    }

    fn create(writer: &ResourceTreeWriter, name: &str, parent: &ResourceId, ty: ResourceType) -> ResourceId {
        let id = writer.generate_resource_id().unwrap();
        writer
            .create_resource(&NewResource::new(id.clone(), name, parent.clone(), ty))
            .unwrap();
        id
    }

    fn append(writer: &ResourceTreeWriter, name: &str, parent: &ResourceId) -> ResourceId {
        let id = create(writer, name, parent, ResourceType::CONTENT_INSTANCE);
        writer
            .initialize_element_in_parent_list(ResourceType::CONTENT_INSTANCE, parent, &id, name)
            .unwrap();
        id
    }

    fn container(writer: &ResourceTreeWriter) -> ResourceId {
        let cse = create(writer, "InCSE1", &ResourceId::null(), ResourceType::CSE_BASE);
        writer.create_cse_by_name("InCSE1", &cse).unwrap();
        create(writer, "cnt", &cse, ResourceType::CONTAINER)
    }

    fn chain(writer: &ResourceTreeWriter, parent: &ResourceId) -> Vec<ResourceId> {
        writer
            .context
            .reader()
            .sibling_chain(parent, ResourceType::CONTENT_INSTANCE)
    }

    #[test]
    fn create_mirrors_store_and_cache() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let stored = f.store.retrieve_resource_by_id(&cnt).unwrap().unwrap();
        assert_eq!(stored.name, "cnt");
        assert_eq!(stored.oldest_latest.len(), ResourceType::CHAINED.len());

        let reader = f.writer.context.reader();
        let cached = reader.retrieve_resource_by_id(&cnt).unwrap();
        assert_eq!(cached.resource_type(), ResourceType::CONTAINER);
        assert_eq!(
            reader.retrieve_child_resource_id_by_name(cached.parent_id(), "cnt"),
            Some(cnt)
        );
    }

    #[test]
    fn store_failure_leaves_cache_untouched() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        f.store.set_fail_writes(true);

        let id = ResourceId::new("500");
        let err = f
            .writer
            .create_resource(&NewResource::new(id.clone(), "cin", cnt.clone(), ResourceType::CONTENT_INSTANCE))
            .unwrap_err();
        assert!(matches!(err, TreeError::Store(_)));
        assert!(f.writer.context.cache().cached_resource(&id).is_none());
        assert!(f.writer.context.reader().retrieve_child_by_name(&cnt, "cin").is_none());
    }

    #[test]
    fn append_builds_doubly_linked_chain() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let ids: Vec<ResourceId> = (0..4).map(|i| append(&f.writer, &format!("cin{i}"), &cnt)).collect();

        let reader = f.writer.context.reader();
        let ol = reader
            .retrieve_oldest_latest_by_resource_type(&cnt, ResourceType::CONTENT_INSTANCE)
            .unwrap();
        assert_eq!(ol.oldest_id, ids[0]);
        assert_eq!(ol.latest_id, ids[3]);
        assert_eq!(chain(&f.writer, &cnt), ids);
        let mut reversed = ids.clone();
        reversed.reverse();
        assert_eq!(
            reader.sibling_chain_reversed(&cnt, ResourceType::CONTENT_INSTANCE),
            reversed
        );

        let stored = f.store.retrieve_child_by_name(&cnt, "cin1").unwrap().unwrap();
        assert_eq!(stored.prev_id, ids[0]);
        assert_eq!(stored.next_id, ids[2]);
    }

    #[test]
    fn unlink_only_child_resets_chain() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let only = append(&f.writer, "cin0", &cnt);

        f.writer
            .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &only, "cin0")
            .unwrap();
        let ol = f
            .writer
            .context
            .reader()
            .retrieve_oldest_latest_by_resource_type(&cnt, ResourceType::CONTENT_INSTANCE)
            .unwrap();
        assert!(ol.oldest_id.is_null());
        assert!(ol.latest_id.is_null());
    }

    #[test]
    fn unlink_latest_and_oldest() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let ids: Vec<ResourceId> = (0..3).map(|i| append(&f.writer, &format!("cin{i}"), &cnt)).collect();

        f.writer
            .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &ids[2], "cin2")
            .unwrap();
        assert_eq!(chain(&f.writer, &cnt), ids[..2].to_vec());

        f.writer
            .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &ids[0], "cin0")
            .unwrap();
        assert_eq!(chain(&f.writer, &cnt), vec![ids[1].clone()]);
        let edge = f.store.retrieve_child_by_name(&cnt, "cin1").unwrap().unwrap();
        assert!(edge.prev_id.is_null());
        assert!(edge.next_id.is_null());
    }

    #[test]
    fn unlink_middle_detaches_by_default() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let ids: Vec<ResourceId> = (0..3).map(|i| append(&f.writer, &format!("cin{i}"), &cnt)).collect();

        f.writer
            .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &ids[1], "cin1")
            .unwrap();
        assert_eq!(chain(&f.writer, &cnt), vec![ids[0].clone()]);
        let reader = f.writer.context.reader();
        assert!(reader.retrieve_child_by_name(&cnt, "cin0").unwrap().next_id.is_null());
        assert!(reader.retrieve_child_by_name(&cnt, "cin2").unwrap().prev_id.is_null());
    }

    #[test]
    fn unlink_middle_splices_when_configured() {
        let f = fixture(TreeConfig::default().sibling_unlink(SiblingUnlink::Splice));
        let cnt = container(&f.writer);
        let ids: Vec<ResourceId> = (0..3).map(|i| append(&f.writer, &format!("cin{i}"), &cnt)).collect();

        f.writer
            .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &ids[1], "cin1")
            .unwrap();
        assert_eq!(chain(&f.writer, &cnt), vec![ids[0].clone(), ids[2].clone()]);
    }

    #[test]
    fn delete_tree_removes_descendants_first() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let sub = create(&f.writer, "sub", &cnt, ResourceType::CONTAINER);
        let cin = append(&f.writer, "cin0", &sub);
        let snapshot = f
            .writer
            .context
            .reader()
            .retrieve_resource_by_id(&cnt)
            .unwrap()
            .snapshot();

        f.writer.delete_resource_tree(&snapshot).unwrap();
        for id in [&cnt, &sub, &cin] {
            assert!(f.store.retrieve_resource_by_id(id).unwrap().is_none());
            assert!(f.writer.context.reader().retrieve_resource_by_id(id).is_none());
        }
        assert!(matches!(
            f.writer.delete_resource_tree(&snapshot),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn relocation_keys_edge_by_id() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        let ids: Vec<ResourceId> = (0..3).map(|i| append(&f.writer, &format!("cin{i}"), &cnt)).collect();

        f.writer.move_parent_child_link_to_delete_parent(&ids[2]).unwrap();
        let reader = f.writer.context.reader();
        assert!(reader.retrieve_child_by_name(&cnt, "cin2").is_none());
        let moved = reader
            .retrieve_child_by_name(&ResourceId::delete_root(), ids[2].as_str())
            .unwrap();
        assert_eq!(moved.resource_id, ids[2]);
        assert_eq!(chain(&f.writer, &cnt), ids[..2].to_vec());

        assert!(f.writer.move_parent_child_link_to_delete_parent(&ids[2]).is_err());
        assert!(f
            .writer
            .move_parent_child_link_to_delete_parent(&ResourceId::delete_root())
            .is_err());
    }

    #[test]
    fn writes_are_published() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        f.writer.update_json_resource_content_string(&cnt, r#"{"mni":5}"#).unwrap();
        f.writer.context.notifier().process_pending();

        let kinds: Vec<OperationKind> = f.log.poll(0, 100).into_iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Create, OperationKind::Create, OperationKind::Update]
        );
    }

    #[test]
    fn ae_mapping_delete_invalidates_cache() {
        let f = fixture(TreeConfig::default());
        f.writer.create_ae_under_cse("InCSE1", "Cae1", &"9".into()).unwrap();
        let reader = f.writer.context.reader();
        assert_eq!(reader.retrieve_ae_resource_id_by_ae_id("InCSE1", "Cae1"), Some("9".into()));

        f.writer.delete_ae_id_to_resource_id_mapping("InCSE1", "Cae1").unwrap();
        assert!(reader.retrieve_ae_resource_id_by_ae_id("InCSE1", "Cae1").is_none());
    }

    #[test]
    fn re_initialize_keeps_delete_root() {
        let f = fixture(TreeConfig::default());
        let cnt = container(&f.writer);
        f.writer.re_initialize_datastore().unwrap();
        assert!(f.writer.context.reader().retrieve_resource_by_id(&cnt).is_none());
        assert!(f
            .writer
            .context
            .reader()
            .retrieve_resource_by_id(&ResourceId::delete_root())
            .is_some());
    }
}
