//! Backing store trait definition.

use crate::error::StoreResult;
use crate::types::{CseRecord, ParentChildEdge, ResourceId, ResourceType, StoredResource};

/// The durable store underneath the resource tree.
///
/// A store is a key-value store keyed by resource id, CSE name and
/// `(parent id, child name)` edge. It does not interpret resource content
/// and it does not maintain sibling chains on its own; the tree writer owns
/// those invariants and drives the store one record at a time.
///
/// # Invariants
///
/// - `create_resource` writes the resource record, an empty child list for
///   non-leaf types, and the edge from the parent (when the parent is not the
///   null sentinel)
/// - `delete_resource` removes the record, its child list and the parent's
///   edge to it; descendants are the caller's responsibility
/// - There is no partial-success or rollback contract: a failed write may
///   leave earlier writes of the same logical operation in place
/// - Stores must be `Send + Sync` so a single instance can serve foreground
///   callers and background workers
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and ephemeral trees
pub trait ResourceStore: Send + Sync {
    /// Reads a resource record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read itself fails. A missing record is `Ok(None)`.
    fn retrieve_resource_by_id(&self, resource_id: &ResourceId) -> StoreResult<Option<StoredResource>>;

    /// Reads a CSE record by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_cse_by_name(&self, name: &str) -> StoreResult<Option<CseRecord>>;

    /// Reads every edge under `parent_id`.
    ///
    /// Returns `Ok(None)` when the parent has no child list at all, which is
    /// distinct from an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_parent_child_list(
        &self,
        parent_id: &ResourceId,
    ) -> StoreResult<Option<Vec<ParentChildEdge>>>;

    /// Reads one edge by `(parent_id, name)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_child_by_name(
        &self,
        parent_id: &ResourceId,
        name: &str,
    ) -> StoreResult<Option<ParentChildEdge>>;

    /// Reads every CSE record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_full_cse_list(&self) -> StoreResult<Vec<CseRecord>>;

    /// Reads every resource record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_full_resource_list(&self) -> StoreResult<Vec<StoredResource>>;

    /// Resolves an AE-ID registered under `cse_name` to its resource id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_ae_resource_id_by_ae_id(
        &self,
        cse_name: &str,
        ae_id: &str,
    ) -> StoreResult<Option<ResourceId>>;

    /// Resolves a remote CSE-ID registered under `cse_name` to its resource id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn retrieve_remote_cse_resource_id(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
    ) -> StoreResult<Option<ResourceId>>;

    /// Allocates a fresh resource id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot allocate.
    fn next_resource_id(&self) -> StoreResult<ResourceId>;

    /// Writes a CSE record, overwriting any record with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn create_cse_by_name(&self, name: &str, resource_id: &ResourceId) -> StoreResult<()>;

    /// Writes a new resource, its empty child list and its parent edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the parent has no child list.
    fn create_resource(&self, resource: &StoredResource) -> StoreResult<()>;

    /// Replaces the serialized content of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist or the write fails.
    fn update_json_resource_content(&self, resource_id: &ResourceId, json: &str) -> StoreResult<()>;

    /// Sets the oldest/latest pointers of `resource_type` children under `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist or the write fails.
    fn update_oldest_latest(
        &self,
        resource_id: &ResourceId,
        resource_type: ResourceType,
        oldest_id: &ResourceId,
        latest_id: &ResourceId,
    ) -> StoreResult<()>;

    /// Writes an edge under `parent_id`, overwriting an edge of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent has no child list or the write fails.
    fn create_parent_child_link(&self, parent_id: &ResourceId, edge: &ParentChildEdge) -> StoreResult<()>;

    /// Sets the `next` pointer of the named edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge does not exist or the write fails.
    fn update_child_sibling_next(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        next_id: &ResourceId,
    ) -> StoreResult<()>;

    /// Sets the `prev` pointer of the named edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge does not exist or the write fails.
    fn update_child_sibling_prev(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        prev_id: &ResourceId,
    ) -> StoreResult<()>;

    /// Removes the named edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge does not exist or the write fails.
    fn remove_parent_child_link(&self, parent_id: &ResourceId, child_name: &str) -> StoreResult<()>;

    /// Moves the named edge from `old_parent_id` to `new_parent_id`, storing
    /// it under `new_child_name`. The resource record itself is not touched.
    ///
    /// # Errors
    ///
    /// Returns an error if either child list is missing, the edge does not
    /// exist, or the write fails.
    fn move_parent_child_link(
        &self,
        child_name: &str,
        old_parent_id: &ResourceId,
        new_parent_id: &ResourceId,
        new_child_name: &str,
    ) -> StoreResult<()>;

    /// Deletes a resource record, its child list and the parent's edge to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist or the write fails.
    fn delete_resource(&self, resource_id: &ResourceId, parent_id: &ResourceId, name: &str) -> StoreResult<()>;

    /// Registers an AE-ID under a CSE.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn create_ae_id_mapping(&self, cse_name: &str, ae_id: &str, resource_id: &ResourceId) -> StoreResult<()>;

    /// Removes an AE-ID registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping does not exist or the write fails.
    fn delete_ae_id_mapping(&self, cse_name: &str, ae_id: &str) -> StoreResult<()>;

    /// Registers a remote CSE-ID under a CSE.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn create_remote_cse_mapping(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
        resource_id: &ResourceId,
    ) -> StoreResult<()>;

    /// Removes a remote CSE-ID registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping does not exist or the write fails.
    fn delete_remote_cse_mapping(&self, cse_name: &str, remote_cse_id: &str) -> StoreResult<()>;

    /// Drops every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    fn re_initialize(&self) -> StoreResult<()>;

    /// Opens a write batch. Stores without batching accept and ignore it.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch cannot be opened.
    fn begin_batch(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Commits the open write batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn commit_batch(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Releases the store. Later calls may fail with [`crate::StoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be released cleanly.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
