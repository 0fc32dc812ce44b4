//! Demo-tree command implementation.

use super::{populate, CliError, OutputFormat, TreeShape};
use iotdm_core::{HierarchyNode, TransactionManager, TreeConfig};
use iotdm_store::InMemoryStore;
use std::sync::Arc;

/// Runs the demo-tree command.
pub fn run(shape: &TreeShape, format: OutputFormat) -> Result<(), CliError> {
    let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), TreeConfig::default())?;
    let populated = populate(&tm, shape)?;

    let reader = tm.reader();
    let trees: Vec<HierarchyNode> = populated
        .cses
        .iter()
        .filter_map(|cse| reader.hierarchy_snapshot(cse))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&trees)?),
        OutputFormat::Text => {
            for tree in &trees {
                print_node(tree, 0);
            }
            let total: usize = trees.iter().map(HierarchyNode::len).sum();
            println!();
            println!("{} resources in {} CSE(s)", total, trees.len());
        }
    }

    tm.close()?;
    Ok(())
}

fn print_node(node: &HierarchyNode, depth: usize) {
    println!(
        "{:indent$}{} [{}] ({})",
        "",
        node.name,
        node.resource_type,
        node.resource_id,
        indent = depth * 2
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
