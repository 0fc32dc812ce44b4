//! # IoTDM Testkit
//!
//! Test utilities for the IoTDM resource tree.
//!
//! This crate provides:
//! - [`TestTree`], a transaction manager over an inspectable in-memory store
//! - Scenario builders for common tree shapes
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use iotdm_testkit::prelude::*;
//! use iotdm_store::ResourceType;
//!
//! with_test_tree(|tree| {
//!     let cse = tree.create_cse("InCSE1");
//!     let cnt = tree.create("cnt", &cse, ResourceType::CONTAINER);
//!     let cin = tree.append(&cnt, ResourceType::CONTENT_INSTANCE, "cin1");
//!     assert_eq!(tree.chain(&cnt, ResourceType::CONTENT_INSTANCE), vec![cin]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
