//! Verify command implementation.
//!
//! Builds a demo tree, deletes every n-th content instance through the
//! writer and checks the tree's structural invariants afterwards.

use super::{populate, CliError, TreeShape};
use iotdm_core::{SiblingUnlink, TransactionManager, TreeConfig};
use iotdm_store::{InMemoryStore, ResourceId, ResourceStore, ResourceType};
use std::collections::HashSet;
use std::sync::Arc;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of checks run.
    pub checks: usize,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            checks: 0,
            errors: Vec::new(),
        }
    }

    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        self.checks += 1;
        if !ok {
            self.errors.push(message());
        }
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(shape: &TreeShape, delete_every: usize, splice: bool) -> Result<(), CliError> {
    let unlink = if splice {
        SiblingUnlink::Splice
    } else {
        SiblingUnlink::Detach
    };
    let store = Arc::new(InMemoryStore::new());
    let tm = TransactionManager::new(store.clone(), TreeConfig::default().sibling_unlink(unlink))?;
    let populated = populate(&tm, shape)?;

    let mut deleted = HashSet::new();
    if delete_every > 0 {
        let writer = tm.writer();
        let reader = tm.reader();
        for chain in &populated.instances {
            for id in chain.iter().skip(delete_every - 1).step_by(delete_every) {
                if let Some(elem) = reader.retrieve_resource_by_id(id) {
                    writer.delete_resource_tree(&elem.snapshot())?;
                    deleted.insert(id.clone());
                }
            }
        }
    }
    println!("Deleted {} content instance(s), unlink mode {:?}", deleted.len(), unlink);
    println!();

    let mut result = VerifyResult::new();
    check_edges(store.as_ref(), &mut result)?;
    for (cnt, chain) in populated.containers.iter().zip(&populated.instances) {
        let survivors: Vec<ResourceId> = chain.iter().filter(|id| !deleted.contains(*id)).cloned().collect();
        check_chain(&tm, cnt, &survivors, splice, &mut result);
    }

    println!("Checks run: {}", result.checks);
    for error in &result.errors {
        println!("  ERROR: {}", error);
    }
    println!();
    tm.close()?;

    if result.is_ok() {
        println!("✓ Tree verification passed");
        Ok(())
    } else {
        println!("✗ Tree verification failed");
        Err(CliError::Verification(result.errors.len()))
    }
}

/// Every stored edge points at a stored resource whose parent matches,
/// except under the delete root where records keep their old parent.
fn check_edges(store: &dyn ResourceStore, result: &mut VerifyResult) -> Result<(), CliError> {
    let resources = store.retrieve_full_resource_list()?;
    let delete_root = ResourceId::delete_root();
    for parent in &resources {
        let edges = store
            .retrieve_parent_child_list(&parent.resource_id)?
            .unwrap_or_default();
        for edge in edges {
            let child = store.retrieve_resource_by_id(&edge.resource_id)?;
            result.check(child.is_some(), || {
                format!("edge {}/{} points at missing {}", parent.resource_id, edge.name, edge.resource_id)
            });
            if let Some(child) = child {
                let linked_ok = parent.resource_id == delete_root || child.parent_id == parent.resource_id;
                result.check(linked_ok, || {
                    format!(
                        "{} is linked under {} but records parent {}",
                        child.resource_id, parent.resource_id, child.parent_id
                    )
                });
            }
        }
    }
    Ok(())
}

/// The chain pointers reference live children. With splicing, both walks
/// visit exactly the survivors in order.
fn check_chain(
    tm: &TransactionManager,
    cnt: &ResourceId,
    survivors: &[ResourceId],
    splice: bool,
    result: &mut VerifyResult,
) {
    let reader = tm.reader();
    let Some(ol) = reader.retrieve_oldest_latest_by_resource_type(cnt, ResourceType::CONTENT_INSTANCE) else {
        result.check(false, || format!("container {} has no content instance chain entry", cnt));
        return;
    };
    for end in [&ol.oldest_id, &ol.latest_id] {
        result.check(end.is_null() || survivors.contains(end), || {
            format!("chain end {} under {} is not a live child", end, cnt)
        });
    }
    result.check(ol.oldest_id.is_null() == ol.latest_id.is_null(), || {
        format!("chain under {} has only one end set", cnt)
    });

    if splice {
        let forward = reader.sibling_chain(cnt, ResourceType::CONTENT_INSTANCE);
        result.check(forward == survivors, || {
            format!("forward walk under {} visits {} of {} survivors", cnt, forward.len(), survivors.len())
        });
        let mut backward = reader.sibling_chain_reversed(cnt, ResourceType::CONTENT_INSTANCE);
        backward.reverse();
        result.check(backward == survivors, || {
            format!("backward walk under {} disagrees with forward walk", cnt)
        });
    }
}
