//! Resource tree configuration.

use std::time::Duration;

/// How a middle element is removed from a typed sibling chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiblingUnlink {
    /// Clear the predecessor's `next` and the successor's `prev`. The chain
    /// is split at the removed element.
    #[default]
    Detach,
    /// Link the predecessor and successor to each other.
    Splice,
}

/// Configuration for a [`crate::TransactionManager`].
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Maximum cached resources.
    pub resource_cache_capacity: usize,

    /// Maximum cached CSE records.
    pub cse_cache_capacity: usize,

    /// Maximum cached child maps.
    pub child_cache_capacity: usize,

    /// Maximum cached AE-ID mappings per CSE.
    pub ae_cache_capacity: usize,

    /// Resource content longer than this many bytes is not kept in the cache.
    pub content_retain_threshold: usize,

    /// Sleep between TTL garbage collection epochs.
    pub gc_interval: Duration,

    /// Minimum time between background-delete reclamation epochs.
    pub delete_epoch_interval: Duration,

    /// How long the background-delete worker waits for a queued id.
    pub delete_poll_timeout: Duration,

    /// Maximum resources physically deleted per reclamation epoch.
    pub max_deletes_per_epoch: usize,

    /// Operations written per notifier batch.
    pub notifier_batch_size: usize,

    /// How long the notifier writer waits for a queued operation.
    pub notifier_poll_timeout: Duration,

    /// Middle-element unlink policy for typed sibling chains.
    pub sibling_unlink: SiblingUnlink,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            resource_cache_capacity: 400_000,
            cse_cache_capacity: 1_000,
            child_cache_capacity: 400_000,
            ae_cache_capacity: 1_000,
            content_retain_threshold: 1_000,
            gc_interval: Duration::from_secs(1_000),
            delete_epoch_interval: Duration::from_secs(10),
            delete_poll_timeout: Duration::from_secs(30),
            max_deletes_per_epoch: 50,
            notifier_batch_size: 20,
            notifier_poll_timeout: Duration::from_secs(1),
            sibling_unlink: SiblingUnlink::Detach,
        }
    }
}

impl TreeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource cache capacity.
    #[must_use]
    pub const fn resource_cache_capacity(mut self, capacity: usize) -> Self {
        self.resource_cache_capacity = capacity;
        self
    }

    /// Sets the CSE cache capacity.
    #[must_use]
    pub const fn cse_cache_capacity(mut self, capacity: usize) -> Self {
        self.cse_cache_capacity = capacity;
        self
    }

    /// Sets the child map cache capacity.
    #[must_use]
    pub const fn child_cache_capacity(mut self, capacity: usize) -> Self {
        self.child_cache_capacity = capacity;
        self
    }

    /// Sets the per-CSE AE-ID cache capacity.
    #[must_use]
    pub const fn ae_cache_capacity(mut self, capacity: usize) -> Self {
        self.ae_cache_capacity = capacity;
        self
    }

    /// Sets the content retain threshold in bytes.
    #[must_use]
    pub const fn content_retain_threshold(mut self, bytes: usize) -> Self {
        self.content_retain_threshold = bytes;
        self
    }

    /// Sets the TTL garbage collection interval.
    #[must_use]
    pub const fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Sets the minimum time between reclamation epochs.
    #[must_use]
    pub const fn delete_epoch_interval(mut self, interval: Duration) -> Self {
        self.delete_epoch_interval = interval;
        self
    }

    /// Sets the background-delete queue poll timeout.
    #[must_use]
    pub const fn delete_poll_timeout(mut self, timeout: Duration) -> Self {
        self.delete_poll_timeout = timeout;
        self
    }

    /// Sets the maximum deletes per reclamation epoch.
    #[must_use]
    pub const fn max_deletes_per_epoch(mut self, max: usize) -> Self {
        self.max_deletes_per_epoch = max;
        self
    }

    /// Sets the notifier batch size.
    #[must_use]
    pub const fn notifier_batch_size(mut self, size: usize) -> Self {
        self.notifier_batch_size = size;
        self
    }

    /// Sets the notifier poll timeout.
    #[must_use]
    pub const fn notifier_poll_timeout(mut self, timeout: Duration) -> Self {
        self.notifier_poll_timeout = timeout;
        self
    }

    /// Sets the middle-element unlink policy.
    #[must_use]
    pub const fn sibling_unlink(mut self, policy: SiblingUnlink) -> Self {
        self.sibling_unlink = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TreeConfig::default();
        assert_eq!(config.resource_cache_capacity, 400_000);
        assert_eq!(config.cse_cache_capacity, 1_000);
        assert_eq!(config.max_deletes_per_epoch, 50);
        assert_eq!(config.delete_epoch_interval, Duration::from_secs(10));
        assert_eq!(config.sibling_unlink, SiblingUnlink::Detach);
    }

    #[test]
    fn builder_pattern() {
        let config = TreeConfig::new()
            .resource_cache_capacity(16)
            .max_deletes_per_epoch(5)
            .sibling_unlink(SiblingUnlink::Splice)
            .gc_interval(Duration::from_millis(10));

        assert_eq!(config.resource_cache_capacity, 16);
        assert_eq!(config.max_deletes_per_epoch, 5);
        assert_eq!(config.sibling_unlink, SiblingUnlink::Splice);
        assert_eq!(config.gc_interval, Duration::from_millis(10));
    }
}
