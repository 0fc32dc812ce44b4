//! Record types shared by the backing store and the resource tree.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Sentinel id marking the end of a sibling chain or the absence of a parent.
pub const NULL_RESOURCE_ID: &str = "0";

/// Id of the distinguished resource that soft-deleted subtrees are moved under.
pub const SYS_DELETE_RESOURCE_ID: &str = "1";

/// First id handed out by a store's id generator.
pub const FIRST_RESOURCE_ID: u64 = 2;

/// Identifier of a resource in the tree.
///
/// Ids are assigned by the backing store and never reused while the
/// resource exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The null sentinel.
    #[must_use]
    pub fn null() -> Self {
        Self(NULL_RESOURCE_ID.to_owned())
    }

    /// The delete-root id.
    #[must_use]
    pub fn delete_root() -> Self {
        Self(SYS_DELETE_RESOURCE_ID.to_owned())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the null sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == NULL_RESOURCE_ID
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Numeric oneM2M resource type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(pub u16);

impl ResourceType {
    /// Access control policy.
    pub const ACCESS_CONTROL_POLICY: Self = Self(1);
    /// Application entity.
    pub const AE: Self = Self(2);
    /// Container.
    pub const CONTAINER: Self = Self(3);
    /// Content instance.
    pub const CONTENT_INSTANCE: Self = Self(4);
    /// CSE base.
    pub const CSE_BASE: Self = Self(5);
    /// Group.
    pub const GROUP: Self = Self(9);
    /// Node.
    pub const NODE: Self = Self(14);
    /// Remote CSE.
    pub const REMOTE_CSE: Self = Self(16);
    /// Subscription.
    pub const SUBSCRIPTION: Self = Self(23);
    /// Internal bookkeeping resources such as the delete root.
    pub const SYSTEM: Self = Self(0);

    /// Types whose siblings are threaded into an oldest/latest chain.
    pub const CHAINED: [Self; 2] = [Self::CONTENT_INSTANCE, Self::SUBSCRIPTION];

    /// Returns the raw tag.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Leaf types never have children, so no child list is kept for them.
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.0 == Self::CONTENT_INSTANCE.0
    }

    /// Returns true if siblings of this type keep an oldest/latest chain.
    #[must_use]
    pub fn is_chained(self) -> bool {
        Self::CHAINED.contains(&self)
    }

    /// Short oneM2M name of the type, when known.
    #[must_use]
    pub fn short_name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("sys"),
            1 => Some("acp"),
            2 => Some("ae"),
            3 => Some("cnt"),
            4 => Some("cin"),
            5 => Some("cb"),
            9 => Some("grp"),
            14 => Some("nod"),
            16 => Some("csr"),
            23 => Some("sub"),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.short_name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A CSE base record: the root of one tenant's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CseRecord {
    /// Unique CSE name (also its CSE-ID).
    pub name: String,
    /// Resource id of the CSE base resource.
    pub resource_id: ResourceId,
}

impl CseRecord {
    /// Creates a CSE record.
    pub fn new(name: impl Into<String>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Head and tail of the typed sibling chain under one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldestLatest {
    /// The sibling type this chain threads.
    pub resource_type: ResourceType,
    /// First (oldest) child of the chain, or the null sentinel.
    pub oldest_id: ResourceId,
    /// Last (latest) child of the chain, or the null sentinel.
    pub latest_id: ResourceId,
}

impl OldestLatest {
    /// Creates a pointer pair.
    pub fn new(resource_type: ResourceType, oldest_id: ResourceId, latest_id: ResourceId) -> Self {
        Self {
            resource_type,
            oldest_id,
            latest_id,
        }
    }

    /// An empty chain for `resource_type`.
    #[must_use]
    pub fn empty(resource_type: ResourceType) -> Self {
        Self::new(resource_type, ResourceId::null(), ResourceId::null())
    }

    /// Returns true if the chain has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest_id.is_null()
    }
}

/// A resource record as persisted by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResource {
    /// Globally unique id.
    pub resource_id: ResourceId,
    /// Name, unique among siblings.
    pub name: String,
    /// Parent id (back-reference), or the null sentinel for roots.
    pub parent_id: ResourceId,
    /// Resource type tag.
    pub resource_type: ResourceType,
    /// Serialized attribute payload.
    pub content_json: String,
    /// Target URI of the parent at creation time.
    pub parent_target_uri: String,
    /// Oldest/latest chain heads for chained child types.
    pub oldest_latest: Vec<OldestLatest>,
}

impl StoredResource {
    /// Looks up the chain heads for `resource_type`.
    #[must_use]
    pub fn oldest_latest_for(&self, resource_type: ResourceType) -> Option<&OldestLatest> {
        self.oldest_latest
            .iter()
            .find(|ol| ol.resource_type == resource_type)
    }
}

/// The edge from a parent to one named child.
///
/// `prev_id`/`next_id` thread siblings of the same chained type into a
/// doubly linked list ordered by append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChildEdge {
    /// Child name; the key of the edge within its parent.
    pub name: String,
    /// Child resource id.
    pub resource_id: ResourceId,
    /// Previous sibling in the chain, or the null sentinel.
    pub prev_id: ResourceId,
    /// Next sibling in the chain, or the null sentinel.
    pub next_id: ResourceId,
}

impl ParentChildEdge {
    /// Creates an edge with no siblings.
    pub fn new(name: impl Into<String>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into(),
            prev_id: ResourceId::null(),
            next_id: ResourceId::null(),
        }
    }

    /// Sets both sibling pointers.
    #[must_use]
    pub fn with_siblings(mut self, prev_id: ResourceId, next_id: ResourceId) -> Self {
        self.prev_id = prev_id;
        self.next_id = next_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinel() {
        assert!(ResourceId::null().is_null());
        assert!(!ResourceId::from("42").is_null());
        assert_eq!(ResourceId::delete_root().as_str(), SYS_DELETE_RESOURCE_ID);
    }

    #[test]
    fn leaf_and_chained_types() {
        assert!(ResourceType::CONTENT_INSTANCE.is_leaf());
        assert!(!ResourceType::CONTAINER.is_leaf());
        assert!(ResourceType::SUBSCRIPTION.is_chained());
        assert!(!ResourceType::AE.is_chained());
    }

    #[test]
    fn resource_type_display() {
        assert_eq!(format!("{}", ResourceType::CONTAINER), "cnt(3)");
        assert_eq!(format!("{}", ResourceType(99)), "99");
    }

    #[test]
    fn empty_oldest_latest() {
        let ol = OldestLatest::empty(ResourceType::CONTENT_INSTANCE);
        assert!(ol.is_empty());
        assert!(ol.oldest_id.is_null());
    }

    #[test]
    fn edge_builder() {
        let edge = ParentChildEdge::new("cin1", "7").with_siblings("5".into(), ResourceId::null());
        assert_eq!(edge.prev_id.as_str(), "5");
        assert!(edge.next_id.is_null());
    }
}
