//! Write-behind log of applied tree operations.
//!
//! The writer enqueues one [`DbOperation`] per successful create, update or
//! delete. A background thread drains the queue and hands the operations to
//! a [`ChangeLog`] in batches. Downstream listeners read the log and
//! acknowledge what they have processed.
//!
//! # Usage
//!
//! ```rust
//! use iotdm_core::{MemoryChangeLog, DbNotifier, OperationKind};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let log = Arc::new(MemoryChangeLog::new());
//! let notifier = DbNotifier::new(log.clone(), 20, Duration::from_millis(10));
//! notifier.enqueue(OperationKind::Create, &"7".into());
//! notifier.process_pending();
//! assert_eq!(log.history_len(), 1);
//! ```

use crate::error::TreeResult;
use iotdm_store::ResourceId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Kind of applied operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    /// Resource created.
    Create,
    /// Resource content updated.
    Update,
    /// Resource deleted.
    Delete,
}

/// One applied operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbOperation {
    /// Monotonic id assigned at enqueue time.
    pub txn_id: u64,
    /// What happened.
    pub kind: OperationKind,
    /// Which resource it happened to.
    pub resource_id: ResourceId,
}

/// Destination of notifier batches.
pub trait ChangeLog: Send + Sync {
    /// Appends a batch of operations in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be written. The notifier keeps
    /// the batch and retries it.
    fn append_batch(&self, batch: &[DbOperation]) -> TreeResult<()>;
}

enum NotifierMessage {
    Operation(DbOperation),
    Shutdown,
}

type WriterState = (Receiver<NotifierMessage>, Vec<DbOperation>);

/// Queue plus batch writer feeding a [`ChangeLog`].
pub struct DbNotifier {
    sink: Arc<dyn ChangeLog>,
    sender: Sender<NotifierMessage>,
    receiver: Mutex<Option<Receiver<NotifierMessage>>>,
    worker: Mutex<Option<JoinHandle<WriterState>>>,
    backlog: Mutex<Vec<DbOperation>>,
    next_txn_id: AtomicU64,
    batch_size: usize,
    poll_timeout: Duration,
}

impl DbNotifier {
    /// Creates a notifier. No thread runs until [`DbNotifier::start`].
    pub fn new(sink: Arc<dyn ChangeLog>, batch_size: usize, poll_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sink,
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            backlog: Mutex::new(Vec::new()),
            next_txn_id: AtomicU64::new(1),
            batch_size: batch_size.max(1),
            poll_timeout,
        }
    }

    /// Queues an operation. Never blocks.
    ///
    /// Returns the assigned transaction id.
    pub fn enqueue(&self, kind: OperationKind, resource_id: &ResourceId) -> u64 {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let op = DbOperation {
            txn_id,
            kind,
            resource_id: resource_id.clone(),
        };
        if self.sender.send(NotifierMessage::Operation(op)).is_err() {
            error!(txn_id, resource_id = %resource_id, "notifier queue closed, notification lost");
        }
        txn_id
    }

    /// Starts the batch writer thread. Does nothing if it already runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(&self) -> TreeResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return Ok(());
        };
        let sink = Arc::clone(&self.sink);
        let backlog = std::mem::take(&mut *self.backlog.lock());
        let batch_size = self.batch_size;
        let poll_timeout = self.poll_timeout;
        let handle = thread::Builder::new()
            .name("iotdm-notifier".into())
            .spawn(move || run_writer(receiver, backlog, sink.as_ref(), batch_size, poll_timeout))?;
        *worker = Some(handle);
        debug!("notifier started");
        Ok(())
    }

    /// Flushes queued operations and stops the writer thread.
    pub fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.sender.send(NotifierMessage::Shutdown);
        match handle.join() {
            Ok((receiver, unwritten)) => {
                *self.receiver.lock() = Some(receiver);
                *self.backlog.lock() = unwritten;
            }
            Err(_) => error!("notifier thread panicked"),
        }
        debug!("notifier stopped");
    }

    /// Returns true while the writer thread runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Writes everything queued so far on the calling thread.
    ///
    /// Only drains when the writer thread is not running. A batch the sink
    /// rejects is kept and written first on the next call. Returns the
    /// number of operations written.
    pub fn process_pending(&self) -> usize {
        let guard = self.receiver.lock();
        let Some(receiver) = guard.as_ref() else {
            return 0;
        };
        let mut backlog = self.backlog.lock();
        let mut batch = std::mem::take(&mut *backlog);
        let mut written = 0;
        while batch.len() < self.batch_size {
            match receiver.try_recv() {
                Ok(NotifierMessage::Operation(op)) => batch.push(op),
                Ok(NotifierMessage::Shutdown) => {}
                Err(_) => break,
            }
            if batch.len() == self.batch_size {
                written += flush(self.sink.as_ref(), &mut batch);
            }
        }
        written += flush(self.sink.as_ref(), &mut batch);
        *backlog = batch;
        written
    }

    /// Operations the sink rejected and that wait for the next write.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }
}

fn flush(sink: &dyn ChangeLog, batch: &mut Vec<DbOperation>) -> usize {
    if batch.is_empty() {
        return 0;
    }
    match sink.append_batch(batch) {
        Ok(()) => {
            trace!(count = batch.len(), "notifier batch written");
            let n = batch.len();
            batch.clear();
            n
        }
        Err(e) => {
            error!(count = batch.len(), error = %e, "notifier batch failed, will retry");
            0
        }
    }
}

const SHUTDOWN_FLUSH_ATTEMPTS: usize = 3;

fn run_writer(
    receiver: Receiver<NotifierMessage>,
    mut batch: Vec<DbOperation>,
    sink: &dyn ChangeLog,
    batch_size: usize,
    poll_timeout: Duration,
) -> WriterState {
    loop {
        match receiver.recv_timeout(poll_timeout) {
            Ok(NotifierMessage::Operation(op)) => {
                batch.push(op);
                if batch.len() >= batch_size {
                    flush(sink, &mut batch);
                }
            }
            Ok(NotifierMessage::Shutdown) => {
                while let Ok(NotifierMessage::Operation(op)) = receiver.try_recv() {
                    batch.push(op);
                }
                for _ in 0..SHUTDOWN_FLUSH_ATTEMPTS {
                    flush(sink, &mut batch);
                    if batch.is_empty() {
                        break;
                    }
                }
                if !batch.is_empty() {
                    warn!(count = batch.len(), "notifier stopped with unwritten operations, keeping them");
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                flush(sink, &mut batch);
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush(sink, &mut batch);
                break;
            }
        }
    }
    (receiver, batch)
}

impl std::fmt::Debug for DbNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbNotifier")
            .field("batch_size", &self.batch_size)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// An in-memory [`ChangeLog`] with subscribers and acknowledgement.
///
/// The log:
/// - Keeps written operations until they are acknowledged
/// - Preserves enqueue order
/// - Forwards every operation to live subscribers
pub struct MemoryChangeLog {
    subscribers: RwLock<Vec<Sender<DbOperation>>>,
    history: RwLock<Vec<DbOperation>>,
    max_history: usize,
}

impl MemoryChangeLog {
    /// Creates a log keeping up to 10000 unacknowledged operations.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a log with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to operations written from now on.
    pub fn subscribe(&self) -> Receiver<DbOperation> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns operations with `txn_id > cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<DbOperation> {
        self.history
            .read()
            .iter()
            .filter(|op| op.txn_id > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drops every operation with `txn_id <= txn_id`.
    pub fn acknowledge(&self, txn_id: u64) {
        self.history.write().retain(|op| op.txn_id > txn_id);
    }

    /// Highest transaction id held, or 0.
    pub fn latest_txn_id(&self) -> u64 {
        self.history.read().last().map(|op| op.txn_id).unwrap_or(0)
    }

    /// Number of operations held.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLog for MemoryChangeLog {
    fn append_batch(&self, batch: &[DbOperation]) -> TreeResult<()> {
        {
            let mut history = self.history.write();
            history.extend_from_slice(batch);
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
        }
        let mut subscribers = self.subscribers.write();
        for op in batch {
            subscribers.retain(|tx| tx.send(op.clone()).is_ok());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChangeLog")
            .field("history_len", &self.history_len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
