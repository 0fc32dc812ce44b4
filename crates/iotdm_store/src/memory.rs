//! In-memory backing store for testing.

use crate::backend::ResourceStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    CseRecord, OldestLatest, ParentChildEdge, ResourceId, ResourceType, StoredResource,
    FIRST_RESOURCE_ID,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Callback run on the reading thread after a child list was read and
/// before it is returned.
pub type ChildListHook = Arc<dyn Fn(&ResourceId) + Send + Sync>;

#[derive(Default)]
struct ReadHook(RwLock<Option<ChildListHook>>);

impl fmt::Debug for ReadHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadHook")
            .field(&self.0.read().is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Tables {
    cses: BTreeMap<String, CseRecord>,
    resources: HashMap<ResourceId, StoredResource>,
    children: HashMap<ResourceId, BTreeMap<String, ParentChildEdge>>,
    ae_ids: HashMap<String, HashMap<String, ResourceId>>,
    remote_cses: HashMap<String, HashMap<String, ResourceId>>,
}

/// Per-kind read counters, used by tests to verify load-through behaviour.
#[derive(Debug, Default)]
struct Counters {
    resource_reads: AtomicU64,
    cse_reads: AtomicU64,
    child_list_reads: AtomicU64,
    child_reads: AtomicU64,
    ae_reads: AtomicU64,
    full_scans: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
}

/// A point-in-time copy of the store's access counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounts {
    /// Calls to `retrieve_resource_by_id`.
    pub resource_reads: u64,
    /// Calls to `retrieve_cse_by_name`.
    pub cse_reads: u64,
    /// Calls to `retrieve_parent_child_list`.
    pub child_list_reads: u64,
    /// Calls to `retrieve_child_by_name`.
    pub child_reads: u64,
    /// Calls to the AE-ID and remote CSE-ID lookups.
    pub ae_reads: u64,
    /// Calls to the full CSE and full resource list scans.
    pub full_scans: u64,
    /// Successful writes.
    pub writes: u64,
    /// Successful batch commits.
    pub commits: u64,
}

/// An in-memory backing store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit and integration tests
/// - The diagnostic CLI
/// - Ephemeral trees that don't need persistence
///
/// Reads are counted per kind and writes can be made to fail on demand,
/// which lets tests observe cache load-through and store-first ordering.
///
/// # Example
///
/// ```rust
/// use iotdm_store::{InMemoryStore, ResourceStore};
///
/// let store = InMemoryStore::new();
/// let id = store.next_resource_id().unwrap();
/// store.create_cse_by_name("InCSE1", &id).unwrap();
/// assert_eq!(store.retrieve_cse_by_name("InCSE1").unwrap().unwrap().resource_id, id);
/// assert_eq!(store.access_counts().cse_reads, 1);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    counters: Counters,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_commits: AtomicBool,
    after_child_list_read: ReadHook,
    closed: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicU64::new(FIRST_RESOURCE_ID),
            counters: Counters::default(),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
            after_child_list_read: ReadHook::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail with [`StoreError::WriteFailed`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent read fail with [`StoreError::ReadFailed`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent batch commit fail.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Installs (or with `None` removes) a callback that runs after every
    /// child list read, outside the table lock. Tests use it to hold a reader
    /// between the store read and the cache fill.
    pub fn set_child_list_hook(&self, hook: Option<ChildListHook>) {
        *self.after_child_list_read.0.write() = hook;
    }

    /// Returns the current access counters.
    #[must_use]
    pub fn access_counts(&self) -> AccessCounts {
        let c = &self.counters;
        AccessCounts {
            resource_reads: c.resource_reads.load(Ordering::Relaxed),
            cse_reads: c.cse_reads.load(Ordering::Relaxed),
            child_list_reads: c.child_list_reads.load(Ordering::Relaxed),
            child_reads: c.child_reads.load(Ordering::Relaxed),
            ae_reads: c.ae_reads.load(Ordering::Relaxed),
            full_scans: c.full_scans.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
        }
    }

    /// Number of resource records held.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.tables.read().resources.len()
    }

    /// Returns true if `parent_id` has a child list.
    #[must_use]
    pub fn has_child_list(&self, parent_id: &ResourceId) -> bool {
        self.tables.read().children.contains_key(parent_id)
    }

    fn begin_read(&self, counter: &AtomicU64) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        counter.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed("injected read failure".into()));
        }
        Ok(())
    }

    fn begin_write(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected write failure".into()));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
    }
}

fn edge_mut<'a>(
    tables: &'a mut Tables,
    parent_id: &ResourceId,
    child_name: &str,
) -> StoreResult<&'a mut ParentChildEdge> {
    tables
        .children
        .get_mut(parent_id)
        .ok_or_else(|| StoreError::missing_child_list(parent_id.as_str()))?
        .get_mut(child_name)
        .ok_or_else(|| StoreError::not_found("child", format!("{}/{}", parent_id, child_name)))
}

/// Orders ids numerically when they are numeric, lexically otherwise.
fn id_order(id: &ResourceId) -> (usize, &str) {
    (id.as_str().len(), id.as_str())
}

impl ResourceStore for InMemoryStore {
    fn retrieve_resource_by_id(&self, resource_id: &ResourceId) -> StoreResult<Option<StoredResource>> {
        self.begin_read(&self.counters.resource_reads)?;
        Ok(self.tables.read().resources.get(resource_id).cloned())
    }

    fn retrieve_cse_by_name(&self, name: &str) -> StoreResult<Option<CseRecord>> {
        self.begin_read(&self.counters.cse_reads)?;
        Ok(self.tables.read().cses.get(name).cloned())
    }

    fn retrieve_parent_child_list(
        &self,
        parent_id: &ResourceId,
    ) -> StoreResult<Option<Vec<ParentChildEdge>>> {
        self.begin_read(&self.counters.child_list_reads)?;
        let edges = self
            .tables
            .read()
            .children
            .get(parent_id)
            .map(|edges| edges.values().cloned().collect());
        let hook = self.after_child_list_read.0.read().clone();
        if let Some(hook) = hook {
            hook(parent_id);
        }
        Ok(edges)
    }

    fn retrieve_child_by_name(
        &self,
        parent_id: &ResourceId,
        name: &str,
    ) -> StoreResult<Option<ParentChildEdge>> {
        self.begin_read(&self.counters.child_reads)?;
        Ok(self
            .tables
            .read()
            .children
            .get(parent_id)
            .and_then(|edges| edges.get(name).cloned()))
    }

    fn retrieve_full_cse_list(&self) -> StoreResult<Vec<CseRecord>> {
        self.begin_read(&self.counters.full_scans)?;
        Ok(self.tables.read().cses.values().cloned().collect())
    }

    fn retrieve_full_resource_list(&self) -> StoreResult<Vec<StoredResource>> {
        self.begin_read(&self.counters.full_scans)?;
        let mut list: Vec<StoredResource> = self.tables.read().resources.values().cloned().collect();
        list.sort_by(|a, b| id_order(&a.resource_id).cmp(&id_order(&b.resource_id)));
        Ok(list)
    }

    fn retrieve_ae_resource_id_by_ae_id(
        &self,
        cse_name: &str,
        ae_id: &str,
    ) -> StoreResult<Option<ResourceId>> {
        self.begin_read(&self.counters.ae_reads)?;
        Ok(self
            .tables
            .read()
            .ae_ids
            .get(cse_name)
            .and_then(|m| m.get(ae_id).cloned()))
    }

    fn retrieve_remote_cse_resource_id(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
    ) -> StoreResult<Option<ResourceId>> {
        self.begin_read(&self.counters.ae_reads)?;
        Ok(self
            .tables
            .read()
            .remote_cses
            .get(cse_name)
            .and_then(|m| m.get(remote_cse_id).cloned()))
    }

    fn next_resource_id(&self) -> StoreResult<ResourceId> {
        self.begin_write()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ResourceId::new(id.to_string()))
    }

    fn create_cse_by_name(&self, name: &str, resource_id: &ResourceId) -> StoreResult<()> {
        self.begin_write()?;
        self.tables
            .write()
            .cses
            .insert(name.to_owned(), CseRecord::new(name, resource_id.clone()));
        self.wrote();
        Ok(())
    }

    fn create_resource(&self, resource: &StoredResource) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        let id = &resource.resource_id;

        if !resource.parent_id.is_null() && !tables.children.contains_key(&resource.parent_id) {
            return Err(StoreError::missing_child_list(resource.parent_id.as_str()));
        }

        tables.resources.insert(id.clone(), resource.clone());
        if !resource.resource_type.is_leaf() {
            tables.children.entry(id.clone()).or_default();
        }
        if let Some(siblings) = tables.children.get_mut(&resource.parent_id) {
            siblings.insert(
                resource.name.clone(),
                ParentChildEdge::new(resource.name.clone(), id.clone()),
            );
        }
        self.wrote();
        Ok(())
    }

    fn update_json_resource_content(&self, resource_id: &ResourceId, json: &str) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        let resource = tables
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| StoreError::not_found("resource", resource_id.as_str()))?;
        resource.content_json = json.to_owned();
        self.wrote();
        Ok(())
    }

    fn update_oldest_latest(
        &self,
        resource_id: &ResourceId,
        resource_type: ResourceType,
        oldest_id: &ResourceId,
        latest_id: &ResourceId,
    ) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        let resource = tables
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| StoreError::not_found("resource", resource_id.as_str()))?;
        let pointers = OldestLatest::new(resource_type, oldest_id.clone(), latest_id.clone());
        match resource
            .oldest_latest
            .iter_mut()
            .find(|ol| ol.resource_type == resource_type)
        {
            Some(existing) => *existing = pointers,
            None => resource.oldest_latest.push(pointers),
        }
        self.wrote();
        Ok(())
    }

    fn create_parent_child_link(&self, parent_id: &ResourceId, edge: &ParentChildEdge) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        tables
            .children
            .get_mut(parent_id)
            .ok_or_else(|| StoreError::missing_child_list(parent_id.as_str()))?
            .insert(edge.name.clone(), edge.clone());
        self.wrote();
        Ok(())
    }

    fn update_child_sibling_next(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        next_id: &ResourceId,
    ) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        edge_mut(&mut tables, parent_id, child_name)?.next_id = next_id.clone();
        self.wrote();
        Ok(())
    }

    fn update_child_sibling_prev(
        &self,
        parent_id: &ResourceId,
        child_name: &str,
        prev_id: &ResourceId,
    ) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        edge_mut(&mut tables, parent_id, child_name)?.prev_id = prev_id.clone();
        self.wrote();
        Ok(())
    }

    fn remove_parent_child_link(&self, parent_id: &ResourceId, child_name: &str) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        tables
            .children
            .get_mut(parent_id)
            .ok_or_else(|| StoreError::missing_child_list(parent_id.as_str()))?
            .remove(child_name)
            .ok_or_else(|| StoreError::not_found("child", format!("{}/{}", parent_id, child_name)))?;
        self.wrote();
        Ok(())
    }

    fn move_parent_child_link(
        &self,
        child_name: &str,
        old_parent_id: &ResourceId,
        new_parent_id: &ResourceId,
        new_child_name: &str,
    ) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        if !tables.children.contains_key(new_parent_id) {
            return Err(StoreError::missing_child_list(new_parent_id.as_str()));
        }
        let mut edge = tables
            .children
            .get_mut(old_parent_id)
            .ok_or_else(|| StoreError::missing_child_list(old_parent_id.as_str()))?
            .remove(child_name)
            .ok_or_else(|| {
                StoreError::not_found("child", format!("{}/{}", old_parent_id, child_name))
            })?;
        edge.name = new_child_name.to_owned();
        if let Some(siblings) = tables.children.get_mut(new_parent_id) {
            siblings.insert(edge.name.clone(), edge);
        }
        self.wrote();
        Ok(())
    }

    fn delete_resource(&self, resource_id: &ResourceId, parent_id: &ResourceId, name: &str) -> StoreResult<()> {
        self.begin_write()?;
        let mut tables = self.tables.write();
        tables
            .resources
            .remove(resource_id)
            .ok_or_else(|| StoreError::not_found("resource", resource_id.as_str()))?;
        tables.children.remove(resource_id);
        if let Some(siblings) = tables.children.get_mut(parent_id) {
            siblings.remove(name);
        }
        self.wrote();
        Ok(())
    }

    fn create_ae_id_mapping(&self, cse_name: &str, ae_id: &str, resource_id: &ResourceId) -> StoreResult<()> {
        self.begin_write()?;
        self.tables
            .write()
            .ae_ids
            .entry(cse_name.to_owned())
            .or_default()
            .insert(ae_id.to_owned(), resource_id.clone());
        self.wrote();
        Ok(())
    }

    fn delete_ae_id_mapping(&self, cse_name: &str, ae_id: &str) -> StoreResult<()> {
        self.begin_write()?;
        self.tables
            .write()
            .ae_ids
            .get_mut(cse_name)
            .and_then(|m| m.remove(ae_id))
            .ok_or_else(|| StoreError::not_found("ae-id", format!("{}/{}", cse_name, ae_id)))?;
        self.wrote();
        Ok(())
    }

    fn create_remote_cse_mapping(
        &self,
        cse_name: &str,
        remote_cse_id: &str,
        resource_id: &ResourceId,
    ) -> StoreResult<()> {
        self.begin_write()?;
        self.tables
            .write()
            .remote_cses
            .entry(cse_name.to_owned())
            .or_default()
            .insert(remote_cse_id.to_owned(), resource_id.clone());
        self.wrote();
        Ok(())
    }

    fn delete_remote_cse_mapping(&self, cse_name: &str, remote_cse_id: &str) -> StoreResult<()> {
        self.begin_write()?;
        self.tables
            .write()
            .remote_cses
            .get_mut(cse_name)
            .and_then(|m| m.remove(remote_cse_id))
            .ok_or_else(|| {
                StoreError::not_found("remote-cse", format!("{}/{}", cse_name, remote_cse_id))
            })?;
        self.wrote();
        Ok(())
    }

    fn re_initialize(&self) -> StoreResult<()> {
        self.begin_write()?;
        *self.tables.write() = Tables::default();
        self.wrote();
        Ok(())
    }

    fn begin_batch(&self) -> StoreResult<()> {
        self.begin_write()
    }

    fn commit_batch(&self) -> StoreResult<()> {
        self.begin_write()?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected commit failure".into()));
        }
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("in-memory store closed");
        Ok(())
    }
}
