//! TTL garbage collector.
//!
//! Request paths flag expired resources with
//! [`TtlGarbageCollector::add_garbage`]. Every `gc_interval` the collector
//! takes the global exclusion lock, drains the trash set and deletes each
//! flagged subtree using the snapshot captured when it was flagged.

use crate::cache::ResourceSnapshot;
use crate::context::TreeContext;
use crate::error::TreeResult;
use crate::locker::{ExclusiveSection, Locker};
use crate::worker::StopSignal;
use crate::writer::ResourceTreeWriter;
use iotdm_store::ResourceId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one GC epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcEpochReport {
    /// Entries taken from the trash set.
    pub attempted: usize,
    /// Subtrees deleted.
    pub reclaimed: usize,
    /// Deletions that failed and were dropped.
    pub failed: usize,
}

/// Periodic reclaimer of flagged resources.
pub struct TtlGarbageCollector {
    context: Arc<TreeContext>,
    locker: Arc<dyn Locker>,
    trash: Mutex<HashMap<ResourceId, ResourceSnapshot>>,
    interval: Duration,
    signal: StopSignal,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TtlGarbageCollector {
    /// Creates an idle collector.
    pub fn new(context: Arc<TreeContext>, locker: Arc<dyn Locker>, interval: Duration) -> Self {
        Self {
            context,
            locker,
            trash: Mutex::new(HashMap::new()),
            interval,
            signal: StopSignal::new(),
            worker: Mutex::new(None),
        }
    }

    /// Flags a resource for reclamation. Flagging the same id twice keeps
    /// the latest snapshot.
    pub fn add_garbage(&self, snapshot: ResourceSnapshot) {
        self.trash
            .lock()
            .insert(snapshot.resource_id.clone(), snapshot);
    }

    /// Number of flagged resources awaiting the next epoch.
    pub fn pending(&self) -> usize {
        self.trash.lock().len()
    }

    /// Runs one epoch under the global exclusion lock.
    ///
    /// Element failures are logged and do not stop the epoch.
    pub fn run_epoch(&self) -> GcEpochReport {
        let _section = ExclusiveSection::enter(self.locker.as_ref());
        let drained: Vec<ResourceSnapshot> = self.trash.lock().drain().map(|(_, s)| s).collect();
        info!(count = drained.len(), "ttl gc epoch started");

        let mut report = GcEpochReport {
            attempted: drained.len(),
            ..GcEpochReport::default()
        };
        for snapshot in &drained {
            let writer = ResourceTreeWriter::new(Arc::clone(&self.context));
            match writer.delete_resource_tree(snapshot) {
                Ok(()) => report.reclaimed += 1,
                Err(e) => {
                    warn!(
                        resource_id = %snapshot.resource_id,
                        error = %e,
                        "ttl gc could not delete resource, possibly removed with another subtree"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            reclaimed = report.reclaimed,
            failed = report.failed,
            "ttl gc epoch finished"
        );
        report
    }

    /// Starts the periodic thread. Does nothing if it already runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(self: &Arc<Self>) -> TreeResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        self.signal.reset();
        let gc = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("iotdm-ttl-gc".into())
            .spawn(move || {
                while !gc.signal.wait(gc.interval) {
                    gc.run_epoch();
                }
            })?;
        *worker = Some(handle);
        debug!(interval = ?self.interval, "ttl gc started");
        Ok(())
    }

    /// Stops the periodic thread and waits for it. Flagged entries stay in
    /// the trash set.
    pub fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        self.signal.stop();
        if handle.join().is_err() {
            error!("ttl gc thread panicked");
        }
        debug!("ttl gc stopped");
    }

    /// Returns true while the periodic thread runs.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl std::fmt::Debug for TtlGarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlGarbageCollector")
            .field("interval", &self.interval)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::TreeConfig;
    use crate::locker::StripedLocker;
    use crate::notifier::{DbNotifier, MemoryChangeLog};
    use crate::reader::ResourceTreeReader;
    use crate::remote_cse::NoRemoteCses;
    use crate::request::NewResource;
    use iotdm_store::{InMemoryStore, ResourceStore, ResourceType};

    fn collector(interval: Duration) -> (Arc<TtlGarbageCollector>, ResourceTreeWriter) {
        let config = TreeConfig::default();
        let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
        let cache = Arc::new(Cache::new(Arc::clone(&store), &config));
        let reader = Arc::new(ResourceTreeReader::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::new(NoRemoteCses),
        ));
        let notifier = Arc::new(DbNotifier::new(
            Arc::new(MemoryChangeLog::new()),
            20,
            Duration::from_millis(10),
        ));
        let context = Arc::new(TreeContext::new(store, cache, reader, notifier, config));
        let writer = ResourceTreeWriter::new(Arc::clone(&context));
        let gc = Arc::new(TtlGarbageCollector::new(
            context,
            Arc::new(StripedLocker::default()),
            interval,
        ));
        (gc, writer)
    }

    fn create(writer: &ResourceTreeWriter, name: &str, parent: &ResourceId, ty: ResourceType) -> ResourceSnapshot {
        let id = writer.generate_resource_id().unwrap();
        writer
            .create_resource(&NewResource::new(id, name, parent.clone(), ty))
            .unwrap()
            .snapshot()
    }

    #[test]
    fn duplicate_garbage_is_attempted_once() {
        let (gc, writer) = collector(Duration::from_secs(1000));
        let cse = create(&writer, "InCSE1", &ResourceId::null(), ResourceType::CSE_BASE);
        let cnt = create(&writer, "cnt", &cse.resource_id, ResourceType::CONTAINER);

        gc.add_garbage(cnt.clone());
        gc.add_garbage(cnt.clone());
        assert_eq!(gc.pending(), 1);

        let report = gc.run_epoch();
        assert_eq!(report, GcEpochReport { attempted: 1, reclaimed: 1, failed: 0 });
        assert_eq!(gc.pending(), 0);
        assert_eq!(gc.run_epoch().attempted, 0);
    }

    #[test]
    fn failure_does_not_stop_epoch() {
        let (gc, writer) = collector(Duration::from_secs(1000));
        let cse = create(&writer, "InCSE1", &ResourceId::null(), ResourceType::CSE_BASE);
        let a = create(&writer, "a", &cse.resource_id, ResourceType::CONTAINER);
        let b = create(&writer, "b", &cse.resource_id, ResourceType::CONTAINER);
        writer
            .delete_resource_by_id(&a.resource_id, &cse.resource_id, "a")
            .unwrap();

        gc.add_garbage(a);
        gc.add_garbage(b.clone());
        let report = gc.run_epoch();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.failed, 1);
        assert!(writer_reader(&gc).retrieve_resource_by_id(&b.resource_id).is_none());
    }

    fn writer_reader(gc: &TtlGarbageCollector) -> &ResourceTreeReader {
        gc.context.reader()
    }

    #[test]
    fn background_thread_reclaims_and_stops() {
        let (gc, writer) = collector(Duration::from_millis(10));
        let cse = create(&writer, "InCSE1", &ResourceId::null(), ResourceType::CSE_BASE);
        let cnt = create(&writer, "cnt", &cse.resource_id, ResourceType::CONTAINER);

        gc.start().unwrap();
        assert!(gc.is_running());
        gc.add_garbage(cnt);
        for _ in 0..200 {
            if gc.pending() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        gc.stop();
        assert!(!gc.is_running());
        assert_eq!(gc.pending(), 0);
    }
}
