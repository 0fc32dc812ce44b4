//! Reap command implementation.
//!
//! Builds a demo tree, relocates every container under the delete root and
//! runs reclamation epochs until the delete root is empty.

use super::{populate, CliError, OutputFormat, TreeShape};
use iotdm_core::{TransactionManager, TreeConfig};
use iotdm_store::{InMemoryStore, ResourceId};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Reclamation report.
#[derive(Debug, Serialize)]
pub struct ReapReport {
    /// Containers relocated under the delete root.
    pub relocated: usize,
    /// Resources removed per epoch, in order.
    pub epochs: Vec<usize>,
    /// Edges left under the delete root.
    pub remaining: usize,
}

impl ReapReport {
    /// Total resources removed.
    pub fn reclaimed(&self) -> usize {
        self.epochs.iter().sum()
    }
}

/// Runs the reap command.
pub fn run(shape: &TreeShape, max_per_epoch: usize, format: OutputFormat) -> Result<(), CliError> {
    let config = TreeConfig::default().max_deletes_per_epoch(max_per_epoch);
    let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), config)?;
    let populated = populate(&tm, shape)?;

    let processor = tm.delete_processor();
    for cnt in &populated.containers {
        processor.relocate(cnt)?;
    }

    let mut epochs = Vec::new();
    loop {
        let removed = processor.reclaim_epoch();
        if removed == 0 {
            break;
        }
        info!(epoch = epochs.len() + 1, removed, "reclamation epoch finished");
        epochs.push(removed);
    }

    let report = ReapReport {
        relocated: populated.containers.len(),
        remaining: tm
            .reader()
            .retrieve_parent_child_list(&ResourceId::delete_root())
            .len(),
        epochs,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report, max_per_epoch),
    }

    tm.close()?;
    Ok(())
}

fn print_text_output(report: &ReapReport, max_per_epoch: usize) {
    println!("Background Delete");
    println!("=================");
    println!();
    println!("Relocated:      {}", report.relocated);
    println!("Epoch bound:    {}", max_per_epoch);
    println!();
    for (i, removed) in report.epochs.iter().enumerate() {
        println!("  epoch {:>3}: {} removed", i + 1, removed);
    }
    println!();
    println!("Reclaimed:      {}", report.reclaimed());
    println!("Remaining:      {}", report.remaining);
}
