//! # IoTDM Store
//!
//! Backing store contract and record types for the IoTDM resource tree.
//!
//! This crate provides the lowest-level storage abstraction underneath the
//! resource tree. A store is a durable key-value store keyed by resource id,
//! CSE name and `(parent id, child name)` edge; it does not maintain
//! sibling chains or caches.
//!
//! ## Design Principles
//!
//! - Stores write one record group per call, with no rollback contract
//! - No knowledge of caching, sibling chain maintenance or garbage collection
//! - Must be `Send + Sync` for concurrent access
//! - The tree layer owns all cross-record invariants
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral trees
//!
//! ## Example
//!
//! ```rust
//! use iotdm_store::{InMemoryStore, ResourceStore, ResourceType, StoredResource};
//!
//! let store = InMemoryStore::new();
//! let id = store.next_resource_id().unwrap();
//! store.create_resource(&StoredResource {
//!     resource_id: id.clone(),
//!     name: "InCSE1".into(),
//!     parent_id: iotdm_store::ResourceId::null(),
//!     resource_type: ResourceType::CSE_BASE,
//!     content_json: "{}".into(),
//!     parent_target_uri: String::new(),
//!     oldest_latest: Vec::new(),
//! }).unwrap();
//! assert!(store.retrieve_resource_by_id(&id).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod types;

pub use backend::ResourceStore;
pub use error::{StoreError, StoreResult};
pub use memory::{AccessCounts, ChildListHook, InMemoryStore};
pub use types::{
    CseRecord, OldestLatest, ParentChildEdge, ResourceId, ResourceType, StoredResource,
    FIRST_RESOURCE_ID, NULL_RESOURCE_ID, SYS_DELETE_RESOURCE_ID,
};
