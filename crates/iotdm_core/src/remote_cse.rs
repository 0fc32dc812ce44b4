//! Live registry of remote CSEs known to the router.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// The router's view of which remote CSEs are currently registered.
///
/// Consulted by [`crate::ResourceTreeReader::is_entity_registered`] before
/// falling back to the AE-ID tables.
pub trait RemoteCseRegistry: Send + Sync {
    /// Returns true if `remote_cse_id` is registered with `cse_base_id`.
    fn is_remote_cse_registered(&self, cse_base_id: &str, remote_cse_id: &str) -> bool;
}

/// A registry that knows nothing. Every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemoteCses;

impl RemoteCseRegistry for NoRemoteCses {
    fn is_remote_cse_registered(&self, _cse_base_id: &str, _remote_cse_id: &str) -> bool {
        false
    }
}

/// An in-memory registry keyed by CSE base.
#[derive(Debug, Default)]
pub struct InMemoryRemoteCseRegistry {
    entries: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryRemoteCseRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a remote CSE with a CSE base.
    pub fn register(&self, cse_base_id: &str, remote_cse_id: &str) {
        self.entries
            .write()
            .entry(cse_base_id.to_owned())
            .or_default()
            .insert(remote_cse_id.to_owned());
    }

    /// Removes a registration. Returns true if it existed.
    pub fn deregister(&self, cse_base_id: &str, remote_cse_id: &str) -> bool {
        self.entries
            .write()
            .get_mut(cse_base_id)
            .is_some_and(|set| set.remove(remote_cse_id))
    }
}

impl RemoteCseRegistry for InMemoryRemoteCseRegistry {
    fn is_remote_cse_registered(&self, cse_base_id: &str, remote_cse_id: &str) -> bool {
        self.entries
            .read()
            .get(cse_base_id)
            .is_some_and(|set| set.contains(remote_cse_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_deregister() {
        let registry = InMemoryRemoteCseRegistry::new();
        assert!(!registry.is_remote_cse_registered("InCSE1", "/mn-cse"));

        registry.register("InCSE1", "/mn-cse");
        assert!(registry.is_remote_cse_registered("InCSE1", "/mn-cse"));
        assert!(!registry.is_remote_cse_registered("InCSE2", "/mn-cse"));

        assert!(registry.deregister("InCSE1", "/mn-cse"));
        assert!(!registry.deregister("InCSE1", "/mn-cse"));
        assert!(!registry.is_remote_cse_registered("InCSE1", "/mn-cse"));
    }

    #[test]
    fn empty_registry() {
        assert!(!NoRemoteCses.is_remote_cse_registered("a", "b"));
    }
}
