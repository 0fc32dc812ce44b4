//! Composition root of the resource tree.
//!
//! The [`TransactionManager`] owns one cache, one reader and the background
//! workers, and hands out stateless writers that share them.

mod manager;

pub use manager::{TransactionManager, TreeComponents};
