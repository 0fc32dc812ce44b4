//! # IoTDM Core
//!
//! Cached, transactional resource tree for the IoTDM data manager.
//!
//! This crate provides:
//! - A multi-level load-through cache over an [`iotdm_store::ResourceStore`]
//! - [`ResourceTreeReader`] and [`ResourceTreeWriter`] keeping cache and
//!   store coherent
//! - Oldest/latest sibling chains for ordered child enumeration
//! - A TTL garbage collector and a background-delete processor
//! - A write-behind notifier publishing applied operations
//!
//! ## Example
//!
//! ```rust
//! use iotdm_core::{NewResource, TransactionManager, TreeConfig};
//! use iotdm_store::{InMemoryStore, ResourceId, ResourceType};
//! use std::sync::Arc;
//!
//! let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), TreeConfig::default()).unwrap();
//! let writer = tm.writer();
//!
//! let cse = writer.generate_resource_id().unwrap();
//! writer
//!     .create_resource(&NewResource::new(cse.clone(), "InCSE1", ResourceId::null(), ResourceType::CSE_BASE))
//!     .unwrap();
//! writer.create_cse_by_name("InCSE1", &cse).unwrap();
//!
//! let found = tm.reader().retrieve_cse("InCSE1").unwrap();
//! assert_eq!(found.resource_id, cse);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bg_delete;
mod cache;
mod config;
mod context;
mod error;
mod gc;
mod locker;
mod notifier;
mod reader;
mod remote_cse;
mod request;
mod stats;
mod transaction;
mod worker;
mod writer;

pub use bg_delete::BackgroundDeleteProcessor;
pub use cache::{Cache, ChildMap, LoadingCache, ResourceElem, ResourceSnapshot};
pub use config::{SiblingUnlink, TreeConfig};
pub use context::TreeContext;
pub use error::{TreeError, TreeResult};
pub use gc::{GcEpochReport, TtlGarbageCollector};
pub use locker::{ExclusiveSection, GlobalLocker, LockToken, Locker, StripedLocker};
pub use notifier::{ChangeLog, DbNotifier, DbOperation, MemoryChangeLog, OperationKind};
pub use reader::{HierarchyNode, ResourceTreeReader};
pub use remote_cse::{InMemoryRemoteCseRegistry, NoRemoteCses, RemoteCseRegistry};
pub use request::{NewResource, ResourceRequest};
pub use stats::{CacheCounters, CacheStatsSnapshot, TreeCacheStats};
pub use transaction::{TransactionManager, TreeComponents};
pub use writer::{ResourceTreeWriter, DELETE_ROOT_NAME};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
