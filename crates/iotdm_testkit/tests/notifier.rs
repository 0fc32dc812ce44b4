//! Operations reaching the change log.

use iotdm_core::{
    ChangeLog, DbOperation, InMemoryRemoteCseRegistry, MemoryChangeLog, OperationKind, StripedLocker,
    TransactionManager, TreeComponents, TreeConfig, TreeError, TreeResult,
};
use iotdm_store::{InMemoryStore, ResourceId, ResourceType};
use iotdm_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn kinds_for(log: &MemoryChangeLog, id: &ResourceId) -> Vec<OperationKind> {
    log.poll(0, usize::MAX)
        .into_iter()
        .filter(|op| &op.resource_id == id)
        .map(|op| op.kind)
        .collect()
}

#[test]
fn writes_are_logged_in_order() {
    let tree = TestTree::new();
    let cse = tree.create_cse("InCSE1");
    let cnt = tree.create("cnt", &cse, ResourceType::CONTAINER);
    tree.writer()
        .update_json_resource_content_string(&cnt, r#"{"mni":10}"#)
        .unwrap();
    tree.writer().delete_resource_by_id(&cnt, &cse, "cnt").unwrap();

    tree.notifier().process_pending();

    assert_eq!(
        kinds_for(&tree.log, &cnt),
        vec![OperationKind::Create, OperationKind::Update, OperationKind::Delete]
    );
    let ids: Vec<u64> = tree.log.poll(0, usize::MAX).iter().map(|op| op.txn_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn failed_store_write_is_not_logged() {
    let tree = TestTree::new();
    let cse = tree.create_cse("InCSE1");
    tree.notifier().process_pending();
    let before = tree.log.history_len();

    tree.store.set_fail_writes(true);
    assert!(tree
        .writer()
        .update_json_resource_content_string(&cse, "{}")
        .is_err());
    tree.store.set_fail_writes(false);

    tree.notifier().process_pending();
    assert_eq!(tree.log.history_len(), before);
}

#[test]
fn chain_maintenance_is_not_logged() {
    let (tree, cnt, ids) = scenarios::container_with_instances(2);
    tree.notifier().process_pending();
    let before = tree.log.history_len();

    tree.writer()
        .delete_resource_in_references(&cnt, ResourceType::CONTENT_INSTANCE, &ids[1], "cin1")
        .unwrap();
    tree.notifier().process_pending();
    assert_eq!(tree.log.history_len(), before);
}

#[test]
fn tree_delete_logs_every_level() {
    let (tree, _cse, [a, b, c]) = scenarios::three_level_chain();
    tree.writer().delete_resource_tree(&tree.snapshot(&a)).unwrap();
    tree.notifier().process_pending();

    for id in [&a, &b, &c] {
        assert_eq!(kinds_for(&tree.log, id).last(), Some(&OperationKind::Delete));
    }
}

#[test]
fn subscribers_see_worker_batches() {
    let config = TreeConfig::default().notifier_poll_timeout(Duration::from_millis(5));
    let tree = TestTree::with_config(config);
    let rx = tree.log.subscribe();
    tree.start_background_workers().unwrap();

    let cse = tree.create_cse("InCSE1");
    let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(got.resource_id, cse);
    assert_eq!(got.kind, OperationKind::Create);

    tree.close().unwrap();
}

#[test]
fn acknowledged_operations_are_dropped() {
    let tree = TestTree::new();
    let cse = tree.create_cse("InCSE1");
    tree.create("a", &cse, ResourceType::AE);
    tree.notifier().process_pending();

    let first = tree.log.poll(0, 1);
    assert_eq!(first.len(), 1);
    tree.log.acknowledge(first[0].txn_id);
    assert!(tree.log.poll(0, usize::MAX).iter().all(|op| op.txn_id > first[0].txn_id));
}

struct UnreliableLog {
    remaining_failures: AtomicUsize,
    inner: MemoryChangeLog,
}

impl ChangeLog for UnreliableLog {
    fn append_batch(&self, batch: &[DbOperation]) -> TreeResult<()> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TreeError::invalid_operation("log offline"));
        }
        self.inner.append_batch(batch)
    }
}

#[test]
fn unreliable_log_receives_everything_eventually() {
    let log = Arc::new(UnreliableLog {
        remaining_failures: AtomicUsize::new(2),
        inner: MemoryChangeLog::new(),
    });
    let components = TreeComponents {
        locker: Arc::new(StripedLocker::default()),
        change_log: log.clone(),
        remote_cses: Arc::new(InMemoryRemoteCseRegistry::new()),
    };
    let config = TreeConfig::default().notifier_poll_timeout(Duration::from_millis(5));
    let tm = TransactionManager::with_components(Arc::new(InMemoryStore::new()), config, components).unwrap();
    tm.start_background_workers().unwrap();

    let writer = tm.writer();
    let cse = writer.generate_resource_id().unwrap();
    writer
        .create_resource(&iotdm_core::NewResource::new(
            cse.clone(),
            "InCSE1",
            ResourceId::null(),
            ResourceType::CSE_BASE,
        ))
        .unwrap();
    tm.close().unwrap();

    assert_eq!(log.inner.history_len(), 1);
    assert_eq!(log.inner.poll(0, 1)[0].resource_id, cse);
}
