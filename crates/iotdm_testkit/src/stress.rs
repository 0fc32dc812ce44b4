//! Stress tests for the resource tree.
//!
//! These helpers drive a [`TestTree`] from several threads and report what
//! succeeded. Callers assert on the tree afterwards.

use crate::fixtures::TestTree;
use iotdm_core::NewResource;
use iotdm_store::{ResourceId, ResourceType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Counts from one stress run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressOutcome {
    /// Operations that succeeded.
    pub succeeded: usize,
    /// Operations that returned an error or found nothing.
    pub failed: usize,
    /// Wall-clock time of the concurrent phase.
    pub elapsed: Duration,
}

impl StressOutcome {
    fn collect(succeeded: &AtomicUsize, failed: &AtomicUsize, start: Instant) -> Self {
        Self {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }

    /// All operations attempted.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Attempted operations per second, 0 for an instant run.
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations per thread.
    pub operations_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 250,
        }
    }
}

/// Appends content instances from several threads into one shared
/// container, serializing each append with the container's resource lock.
///
/// Returns the run result and the container id. Every successful append
/// ends up in the container's chain exactly once.
pub fn stress_concurrent_appends(tree: &TestTree, config: &StressConfig) -> (StressOutcome, ResourceId) {
    let cse = tree.create_cse("StressCSE");
    let cnt = tree.create("cnt", &cse, ResourceType::CONTAINER);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let (cnt, successful, failed) = (&cnt, &successful, &failed);
            scope.spawn(move || {
                let writer = tree.writer();
                for i in 0..config.operations_per_thread {
                    let name = format!("cin-{t}-{i}");
                    let token = tree.locker().lock_resource(cnt);
                    let result = writer.generate_resource_id().and_then(|id| {
                        writer.create_resource(&NewResource::new(
                            id.clone(),
                            name.as_str(),
                            cnt.clone(),
                            ResourceType::CONTENT_INSTANCE,
                        ))?;
                        writer.initialize_element_in_parent_list(
                            ResourceType::CONTENT_INSTANCE,
                            cnt,
                            &id,
                            &name,
                        )
                    });
                    tree.locker().unlock_resource(token);
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    (StressOutcome::collect(&successful, &failed, start), cnt)
}

/// Reads `ids` round-robin from several threads.
///
/// A read succeeds when the resource is found.
pub fn stress_concurrent_reads(tree: &TestTree, ids: &[ResourceId], config: &StressConfig) -> StressOutcome {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();
    if !ids.is_empty() {
        thread::scope(|scope| {
            for t in 0..config.threads {
                let (successful, failed) = (&successful, &failed);
                scope.spawn(move || {
                    let reader = tree.reader();
                    for i in 0..config.operations_per_thread {
                        let id = &ids[(t + i) % ids.len()];
                        match reader.retrieve_resource_by_id(id) {
                            Some(_) => successful.fetch_add(1, Ordering::Relaxed),
                            None => failed.fetch_add(1, Ordering::Relaxed),
                        };
                    }
                });
            }
        });
    }

    StressOutcome::collect(&successful, &failed, start)
}

/// Relocates `ids` under the delete root from several threads while the
/// calling thread runs reclamation epochs until the delete root is empty.
pub fn stress_relocate_and_reclaim(tree: &TestTree, ids: &[ResourceId], config: &StressConfig) -> StressOutcome {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let threads = config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..threads {
            let (successful, failed) = (&successful, &failed);
            scope.spawn(move || {
                for id in ids.iter().skip(t).step_by(threads) {
                    match tree.delete_processor().relocate(id) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    let root = ResourceId::delete_root();
    while tree.store_child_count(&root) > 0 {
        if tree.delete_processor().reclaim_epoch() == 0 {
            break;
        }
    }

    StressOutcome::collect(&successful, &failed, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_rates() {
        let outcome = StressOutcome {
            succeeded: 90,
            failed: 10,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(outcome.total(), 100);
        assert!((outcome.per_second() - 50.0).abs() < 0.01);
        assert_eq!(StressOutcome { elapsed: Duration::ZERO, ..outcome }.per_second(), 0.0);
    }

    #[test]
    fn test_concurrent_appends_small() {
        let tree = TestTree::new();
        let config = StressConfig {
            threads: 3,
            operations_per_thread: 20,
        };
        let (result, cnt) = stress_concurrent_appends(&tree, &config);
        assert_eq!(result.failed, 0);
        assert_eq!(result.succeeded, 60);
        assert_eq!(tree.chain(&cnt, ResourceType::CONTENT_INSTANCE).len(), 60);
    }

    #[test]
    fn test_concurrent_reads_small() {
        let tree = TestTree::new();
        let cse = tree.create_cse("ReadCSE");
        let ids: Vec<ResourceId> = (0..5)
            .map(|i| tree.create(&format!("cnt{i}"), &cse, ResourceType::CONTAINER))
            .collect();
        let config = StressConfig {
            threads: 4,
            operations_per_thread: 50,
        };
        let outcome = stress_concurrent_reads(&tree, &ids, &config);
        assert_eq!(outcome.succeeded, 200);
        assert_eq!(outcome.failed, 0);
    }
}
