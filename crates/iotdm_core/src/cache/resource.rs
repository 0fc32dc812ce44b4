//! Cached resource element.

use iotdm_store::{OldestLatest, ResourceId, ResourceType, StoredResource};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// A resource as held by the cache.
///
/// Identity fields are immutable. Content and oldest/latest pointers are
/// updated in place so every holder of the `Arc` sees the change.
///
/// Content longer than the retain threshold is not kept; readers reload it
/// from the store on demand (see
/// [`crate::ResourceTreeReader::resource_content_json`]).
#[derive(Debug)]
pub struct ResourceElem {
    resource_id: ResourceId,
    name: String,
    parent_id: ResourceId,
    resource_type: ResourceType,
    parent_target_uri: String,
    content: RwLock<Option<String>>,
    oldest_latest: RwLock<BTreeMap<ResourceType, OldestLatest>>,
}

impl ResourceElem {
    /// Builds an element from its parts, applying the retain threshold to `content_json`.
    pub fn new(
        resource_id: ResourceId,
        name: impl Into<String>,
        parent_id: ResourceId,
        resource_type: ResourceType,
        content_json: &str,
        parent_target_uri: impl Into<String>,
        retain_threshold: usize,
    ) -> Self {
        Self {
            resource_id,
            name: name.into(),
            parent_id,
            resource_type,
            parent_target_uri: parent_target_uri.into(),
            content: RwLock::new(retain(content_json, retain_threshold)),
            oldest_latest: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builds an element from a store record.
    #[must_use]
    pub fn from_stored(stored: &StoredResource, retain_threshold: usize) -> Self {
        let elem = Self::new(
            stored.resource_id.clone(),
            stored.name.clone(),
            stored.parent_id.clone(),
            stored.resource_type,
            &stored.content_json,
            stored.parent_target_uri.clone(),
            retain_threshold,
        );
        {
            let mut pointers = elem.oldest_latest.write();
            for ol in &stored.oldest_latest {
                pointers.insert(ol.resource_type, ol.clone());
            }
        }
        elem
    }

    /// Resource id.
    #[must_use]
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent id.
    #[must_use]
    pub fn parent_id(&self) -> &ResourceId {
        &self.parent_id
    }

    /// Resource type.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Target URI of the parent at creation time.
    #[must_use]
    pub fn parent_target_uri(&self) -> &str {
        &self.parent_target_uri
    }

    /// The retained content, or `None` if it was above the threshold.
    #[must_use]
    pub fn retained_content(&self) -> Option<String> {
        self.content.read().clone()
    }

    /// Replaces the content, applying the retain threshold.
    pub fn set_content(&self, content_json: &str, retain_threshold: usize) {
        *self.content.write() = retain(content_json, retain_threshold);
    }

    /// Chain heads for `resource_type` children.
    #[must_use]
    pub fn oldest_latest(&self, resource_type: ResourceType) -> Option<OldestLatest> {
        self.oldest_latest.read().get(&resource_type).cloned()
    }

    /// Sets chain heads for `resource_type` children.
    pub fn set_oldest_latest(&self, resource_type: ResourceType, oldest: ResourceId, latest: ResourceId) {
        self.oldest_latest
            .write()
            .insert(resource_type, OldestLatest::new(resource_type, oldest, latest));
    }

    /// Every chain head pair, ordered by type.
    #[must_use]
    pub fn all_oldest_latest(&self) -> Vec<OldestLatest> {
        self.oldest_latest.read().values().cloned().collect()
    }

    /// Captures the current state.
    #[must_use]
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            resource_id: self.resource_id.clone(),
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
            resource_type: self.resource_type,
            parent_target_uri: self.parent_target_uri.clone(),
            content_json: self.retained_content(),
            oldest_latest: self.all_oldest_latest(),
        }
    }
}

fn retain(content_json: &str, retain_threshold: usize) -> Option<String> {
    (content_json.len() <= retain_threshold).then(|| content_json.to_owned())
}

/// An immutable copy of a cached resource.
///
/// The TTL collector keeps these so it can target a resource's parent and
/// name as they were when it was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    /// Resource id.
    pub resource_id: ResourceId,
    /// Resource name.
    pub name: String,
    /// Parent id.
    pub parent_id: ResourceId,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Target URI of the parent at creation time.
    pub parent_target_uri: String,
    /// Retained content, if any.
    pub content_json: Option<String>,
    /// Chain heads.
    pub oldest_latest: Vec<OldestLatest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(content: &str, threshold: usize) -> ResourceElem {
        ResourceElem::new(
            "5".into(),
            "cnt",
            "2".into(),
            ResourceType::CONTAINER,
            content,
            "/InCSE1",
            threshold,
        )
    }

    #[test]
    fn small_content_is_retained() {
        let e = elem(r#"{"mni":10}"#, 1000);
        assert_eq!(e.retained_content().as_deref(), Some(r#"{"mni":10}"#));
    }

    #[test]
    fn large_content_is_dropped() {
        let big = "x".repeat(1001);
        let e = elem(&big, 1000);
        assert!(e.retained_content().is_none());

        e.set_content("{}", 1000);
        assert_eq!(e.retained_content().as_deref(), Some("{}"));
    }

    #[test]
    fn threshold_is_inclusive() {
        let exact = "y".repeat(8);
        assert!(elem(&exact, 8).retained_content().is_some());
    }

    #[test]
    fn oldest_latest_roundtrip() {
        let e = elem("{}", 1000);
        assert!(e.oldest_latest(ResourceType::CONTENT_INSTANCE).is_none());
        e.set_oldest_latest(ResourceType::CONTENT_INSTANCE, "7".into(), "9".into());
        let ol = e.oldest_latest(ResourceType::CONTENT_INSTANCE).unwrap();
        assert_eq!(ol.oldest_id.as_str(), "7");
        assert_eq!(ol.latest_id.as_str(), "9");
    }

    #[test]
    fn from_stored_copies_pointers() {
        let stored = StoredResource {
            resource_id: "5".into(),
            name: "cnt".into(),
            parent_id: "2".into(),
            resource_type: ResourceType::CONTAINER,
            content_json: "{}".into(),
            parent_target_uri: String::new(),
            oldest_latest: vec![OldestLatest::empty(ResourceType::SUBSCRIPTION)],
        };
        let e = ResourceElem::from_stored(&stored, 1000);
        let snap = e.snapshot();
        assert_eq!(snap.resource_id, stored.resource_id);
        assert_eq!(snap.oldest_latest.len(), 1);
        assert!(snap.oldest_latest[0].is_empty());
    }
}
