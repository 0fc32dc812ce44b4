//! Stats command implementation.

use super::{populate, CliError, OutputFormat, TreeShape};
use iotdm_core::{CacheStatsSnapshot, TransactionManager, TreeCacheStats, TreeConfig};
use iotdm_store::InMemoryStore;
use std::sync::Arc;

/// Runs the stats command.
///
/// Reads every generated resource `passes` times through a cache of
/// `capacity` resources, then prints the cache counters.
pub fn run(shape: &TreeShape, passes: usize, capacity: usize, format: OutputFormat) -> Result<(), CliError> {
    let config = TreeConfig::default().resource_cache_capacity(capacity);
    let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), config)?;
    let populated = populate(&tm, shape)?;

    // Drop what the writes cached so the first pass loads through.
    tm.context().cache().re_initialize();

    let reader = tm.reader();
    for _ in 0..passes {
        for id in populated.all_ids() {
            reader.retrieve_resource_by_id(id);
        }
        for cnt in &populated.containers {
            reader.retrieve_parent_child_list(cnt);
        }
    }

    let stats = tm.cache_stats();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print_text_output(&stats),
    }

    tm.close()?;
    Ok(())
}

fn print_text_output(stats: &TreeCacheStats) {
    println!("Cache Statistics");
    println!("================");
    println!();
    print_table("Resources", &stats.resources);
    print_table("CSEs", &stats.cses);
    print_table("Child maps", &stats.children);
    print_table("AE ids", &stats.ae_ids);
    println!();
    println!("Cached resources:  {}", stats.resource_entries);
    println!("Cached child maps: {}", stats.child_entries);
}

fn print_table(label: &str, s: &CacheStatsSnapshot) {
    println!(
        "  {:<11} hits={} misses={} loads={} failures={} evictions={} ratio={:.1}%",
        label,
        s.hits,
        s.misses,
        s.loads,
        s.load_failures,
        s.evictions,
        s.hit_ratio() * 100.0
    );
}
