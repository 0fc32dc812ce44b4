//! Property-based test generators using proptest.
//!
//! Provides strategies for generating resource names, payloads and
//! sibling-chain operations.

use iotdm_store::ResourceType;
use proptest::prelude::*;

/// Strategy for generating valid resource names.
pub fn resource_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating `count` distinct resource names.
pub fn distinct_names_strategy(count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(resource_name_strategy(), count)
        .prop_map(|names| names.into_iter().collect())
}

/// Strategy for generating serialized attribute payloads.
pub fn content_json_strategy() -> impl Strategy<Value = String> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            "[ -~]{0,32}".prop_map(serde_json::Value::from),
        ],
        0..6,
    )
    .prop_map(|map| {
        let object: serde_json::Map<String, serde_json::Value> = map.into_iter().collect();
        serde_json::Value::Object(object).to_string()
    })
}

/// Strategy for resource types that may have children.
pub fn parent_type_strategy() -> impl Strategy<Value = ResourceType> {
    prop_oneof![
        Just(ResourceType::AE),
        Just(ResourceType::CONTAINER),
        Just(ResourceType::GROUP),
        Just(ResourceType::NODE),
        Just(ResourceType::REMOTE_CSE),
    ]
}

/// Strategy for the chained child types.
pub fn chained_type_strategy() -> impl Strategy<Value = ResourceType> {
    prop_oneof![
        Just(ResourceType::CONTENT_INSTANCE),
        Just(ResourceType::SUBSCRIPTION),
    ]
}

/// Strategy for a chain length and the position of one element to remove.
pub fn chain_removal_strategy(max_len: usize) -> impl Strategy<Value = (usize, usize)> {
    (1..=max_len.max(1)).prop_flat_map(|len| (Just(len), 0..len))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_names_are_valid(name in resource_name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.len() <= 16);
        }

        #[test]
        fn test_content_is_json(json in content_json_strategy()) {
            let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
            prop_assert!(parsed.is_object());
        }

        #[test]
        fn test_removal_index_in_range((len, index) in chain_removal_strategy(10)) {
            prop_assert!(index < len);
        }

        #[test]
        fn test_distinct_names(names in distinct_names_strategy(1..20)) {
            let mut sorted = names.clone();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), names.len());
        }
    }
}
