//! Soft delete by relocation, hard delete in bounded epochs.
//!
//! The request path only enqueues a resource id. The worker relocates the
//! resource's edge under the delete root, and from time to time runs a
//! reclamation epoch that deletes at most `max_deletes_per_epoch` resources
//! from the delete root's subtree, always the deepest one first so no edge
//! is ever left pointing at a deleted parent.
//!
//! An epoch runs when `delete_epoch_interval` has elapsed since the last one,
//! or right away when the previous epoch hit the bound. In that hot state the
//! worker does not block on the queue.

use crate::context::TreeContext;
use crate::error::{TreeError, TreeResult};
use crate::writer::ResourceTreeWriter;
use iotdm_store::{ParentChildEdge, ResourceId};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

enum DeleteCommand {
    Relocate(ResourceId),
    Shutdown,
}

/// Background relocation and reclamation of deleted subtrees.
pub struct BackgroundDeleteProcessor {
    context: Arc<TreeContext>,
    sender: Sender<DeleteCommand>,
    receiver: Mutex<Option<Receiver<DeleteCommand>>>,
    worker: Mutex<Option<JoinHandle<Receiver<DeleteCommand>>>>,
    max_per_epoch: usize,
    epoch_interval: Duration,
    poll_timeout: Duration,
}

impl BackgroundDeleteProcessor {
    /// Creates an idle processor using the limits from the context's
    /// configuration.
    pub fn new(context: Arc<TreeContext>) -> Self {
        let config = context.config();
        let max_per_epoch = config.max_deletes_per_epoch.max(1);
        let epoch_interval = config.delete_epoch_interval;
        let poll_timeout = config.delete_poll_timeout;
        let (sender, receiver) = mpsc::channel();
        Self {
            context,
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            max_per_epoch,
            epoch_interval,
            poll_timeout,
        }
    }

    /// Queues a resource for relocation under the delete root. Never blocks.
    pub fn move_resource_to_delete_parent(&self, resource_id: &ResourceId) {
        if self
            .sender
            .send(DeleteCommand::Relocate(resource_id.clone()))
            .is_err()
        {
            error!(resource_id = %resource_id, "delete queue closed");
        }
    }

    /// Relocates one resource on the calling thread.
    pub fn relocate(&self, resource_id: &ResourceId) -> TreeResult<()> {
        ResourceTreeWriter::new(Arc::clone(&self.context))
            .move_parent_child_link_to_delete_parent(resource_id)
    }

    /// Relocates everything queued so far on the calling thread.
    ///
    /// Only drains when the worker is not running. Returns the number of
    /// successful relocations.
    pub fn process_queue(&self) -> usize {
        let guard = self.receiver.lock();
        let Some(receiver) = guard.as_ref() else {
            return 0;
        };
        let mut relocated = 0;
        while let Ok(command) = receiver.try_recv() {
            if let DeleteCommand::Relocate(id) = command {
                if self.relocate_logged(&id) {
                    relocated += 1;
                }
            }
        }
        relocated
    }

    fn relocate_logged(&self, resource_id: &ResourceId) -> bool {
        match self.relocate(resource_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "relocation failed");
                false
            }
        }
    }

    /// Deletes up to the per-epoch bound of resources under the delete root,
    /// deepest first, inside one write transaction.
    ///
    /// Returns the number of resources removed. A count equal to the bound
    /// means more work is likely pending.
    pub fn reclaim_epoch(&self) -> usize {
        let writer = ResourceTreeWriter::new(Arc::clone(&self.context));
        if let Err(e) = writer.start_write_transaction() {
            error!(error = %e, "could not open reclamation transaction");
            return 0;
        }

        let mut deleted = 0;
        while deleted < self.max_per_epoch {
            let Some((parent_id, leaf)) = self.deepest_under_delete_root() else {
                break;
            };
            match self.delete_leaf(&writer, &parent_id, &leaf) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    error!(resource_id = %leaf.resource_id, error = %e, "reclamation stopped");
                    break;
                }
            }
        }

        if let Err(e) = writer.end_write_transaction() {
            error!(error = %e, deleted, "reclamation commit failed");
        }
        trace!(deleted, "reclamation epoch finished");
        deleted
    }

    /// Follows first children down from the delete root. Returns the deepest
    /// edge and the id of the parent it hangs under.
    fn deepest_under_delete_root(&self) -> Option<(ResourceId, ParentChildEdge)> {
        let reader = self.context.reader();
        let mut parent_id = ResourceId::delete_root();
        let mut deepest = None;
        while let Some(edge) = reader
            .retrieve_parent_child_list_limit_n(&parent_id, 1)
            .into_iter()
            .next()
        {
            let child_id = edge.resource_id.clone();
            deepest = Some((parent_id, edge));
            parent_id = child_id;
        }
        deepest
    }

    fn delete_leaf(
        &self,
        writer: &ResourceTreeWriter,
        parent_id: &ResourceId,
        leaf: &ParentChildEdge,
    ) -> TreeResult<()> {
        match writer.delete_resource_by_id(&leaf.resource_id, parent_id, &leaf.name) {
            Err(TreeError::Store(e)) if e.is_not_found() => {
                debug!(resource_id = %leaf.resource_id, "removing dangling edge");
                writer.remove_parent_child_link(parent_id, &leaf.name)?;
                // The walk found this edge through the cache, which may be stale.
                let cache = self.context.cache();
                cache.delete_resource(&leaf.resource_id, &leaf.name, parent_id);
                cache.invalidate_child_map(parent_id);
                Ok(())
            }
            other => other,
        }
    }

    /// Starts the worker thread. Does nothing if it already runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(self: &Arc<Self>) -> TreeResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return Ok(());
        };
        let processor = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("iotdm-bg-delete".into())
            .spawn(move || processor.run(receiver))?;
        *worker = Some(handle);
        debug!("delete processor started");
        Ok(())
    }

    fn run(&self, receiver: Receiver<DeleteCommand>) -> Receiver<DeleteCommand> {
        let mut last_epoch = Instant::now();
        let mut hot = false;
        loop {
            // Err(true) means the queue is gone or shutting down.
            let next = if hot {
                receiver
                    .try_recv()
                    .map_err(|e| matches!(e, TryRecvError::Disconnected))
            } else {
                let wait = self
                    .epoch_interval
                    .saturating_sub(last_epoch.elapsed())
                    .min(self.poll_timeout);
                receiver
                    .recv_timeout(wait)
                    .map_err(|e| matches!(e, RecvTimeoutError::Disconnected))
            };
            match next {
                Ok(DeleteCommand::Relocate(id)) => {
                    self.relocate_logged(&id);
                }
                Ok(DeleteCommand::Shutdown) | Err(true) => break,
                Err(false) => {}
            }

            if hot || last_epoch.elapsed() >= self.epoch_interval {
                let deleted = self.reclaim_epoch();
                hot = deleted >= self.max_per_epoch;
                last_epoch = Instant::now();
            }
        }

        while let Ok(DeleteCommand::Relocate(id)) = receiver.try_recv() {
            self.relocate_logged(&id);
        }
        receiver
    }

    /// Stops the worker after relocating whatever is still queued.
    pub fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.sender.send(DeleteCommand::Shutdown);
        match handle.join() {
            Ok(receiver) => *self.receiver.lock() = Some(receiver),
            Err(_) => error!("delete processor thread panicked"),
        }
        debug!("delete processor stopped");
    }

    /// Returns true while the worker thread runs.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl std::fmt::Debug for BackgroundDeleteProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundDeleteProcessor")
            .field("max_per_epoch", &self.max_per_epoch)
            .field("epoch_interval", &self.epoch_interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
