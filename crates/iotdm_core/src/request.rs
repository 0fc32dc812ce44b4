//! Request-side contract for resource creation.

use crate::error::TreeResult;
use iotdm_store::{ResourceId, ResourceType};
use serde::Serialize;

/// A pre-validated creation request handed to the writer.
///
/// The request layer has already parsed the protocol payload, validated the
/// attributes and allocated the resource id; the tree never looks inside the
/// content.
pub trait ResourceRequest {
    /// Id allocated for the new resource.
    fn resource_id(&self) -> &ResourceId;
    /// Name, unique among the parent's children.
    fn name(&self) -> &str;
    /// Parent id, or the null sentinel for a root.
    fn parent_id(&self) -> &ResourceId;
    /// Resource type.
    fn resource_type(&self) -> ResourceType;
    /// Serialized attribute payload.
    fn content_json(&self) -> &str;
    /// Target URI of the parent.
    fn parent_target_uri(&self) -> &str;
}

/// A plain [`ResourceRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResource {
    resource_id: ResourceId,
    name: String,
    parent_id: ResourceId,
    resource_type: ResourceType,
    content_json: String,
    parent_target_uri: String,
}

impl NewResource {
    /// Creates a request with empty (`{}`) content and no parent URI.
    pub fn new(
        resource_id: ResourceId,
        name: impl Into<String>,
        parent_id: ResourceId,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            resource_id,
            name: name.into(),
            parent_id,
            resource_type,
            content_json: "{}".to_owned(),
            parent_target_uri: String::new(),
        }
    }

    /// Sets the serialized content.
    #[must_use]
    pub fn with_content_json(mut self, json: impl Into<String>) -> Self {
        self.content_json = json.into();
        self
    }

    /// Serializes `content` as the resource content.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` cannot be serialized.
    pub fn with_content<T: Serialize>(mut self, content: &T) -> TreeResult<Self> {
        self.content_json = serde_json::to_string(content)?;
        Ok(self)
    }

    /// Sets the parent target URI.
    #[must_use]
    pub fn with_parent_target_uri(mut self, uri: impl Into<String>) -> Self {
        self.parent_target_uri = uri.into();
        self
    }
}

impl ResourceRequest for NewResource {
    fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent_id(&self) -> &ResourceId {
        &self.parent_id
    }

    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn content_json(&self) -> &str {
        &self.content_json
    }

    fn parent_target_uri(&self) -> &str {
        &self.parent_target_uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = NewResource::new("9".into(), "cin9", "3".into(), ResourceType::CONTENT_INSTANCE)
            .with_content(&serde_json::json!({"con": "22.5"}))
            .unwrap()
            .with_parent_target_uri("/InCSE1/cnt");

        assert_eq!(req.content_json(), r#"{"con":"22.5"}"#);
        assert_eq!(req.parent_target_uri(), "/InCSE1/cnt");
        assert_eq!(req.resource_type(), ResourceType::CONTENT_INSTANCE);
    }

    #[test]
    fn default_content_is_empty_object() {
        let req = NewResource::new("9".into(), "x", ResourceId::null(), ResourceType::CSE_BASE);
        assert_eq!(req.content_json(), "{}");
    }
}
