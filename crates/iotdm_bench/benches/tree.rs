//! Writer and background-delete benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use iotdm_bench::seeded_tree;
use iotdm_core::{SiblingUnlink, TreeConfig};
use iotdm_store::ResourceType;

/// Benchmark appending content instances to one chain.
fn bench_chain_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_append");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || seeded_tree(TreeConfig::default(), 1, 0).unwrap(),
                    |tree| {
                        let cnt = &tree.containers[0];
                        for i in 0..batch_size {
                            black_box(tree.append(cnt, &format!("cin{i}")).unwrap());
                        }
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

/// Benchmark unlinking chain members in both unlink modes.
fn bench_chain_unlink(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_unlink");

    for (label, mode) in [("detach", SiblingUnlink::Detach), ("splice", SiblingUnlink::Splice)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || seeded_tree(TreeConfig::default().sibling_unlink(mode), 1, 200).unwrap(),
                |tree| {
                    let writer = tree.tm.writer();
                    let cnt = &tree.containers[0];
                    for (i, id) in tree.instances.iter().enumerate().skip(1).step_by(2) {
                        writer
                            .delete_resource_in_references(
                                cnt,
                                ResourceType::CONTENT_INSTANCE,
                                id,
                                &format!("cin{i}"),
                            )
                            .unwrap();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark relocation plus one bounded reclamation epoch.
fn bench_relocate_and_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("relocate_and_reclaim");

    for instances in [0, 10, 40].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(instances),
            instances,
            |b, &instances| {
                b.iter_batched(
                    || seeded_tree(TreeConfig::default(), 5, instances).unwrap(),
                    |tree| {
                        let processor = tree.tm.delete_processor();
                        for cnt in &tree.containers {
                            processor.relocate(cnt).unwrap();
                        }
                        black_box(processor.reclaim_epoch());
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_append,
    bench_chain_unlink,
    bench_relocate_and_reclaim,
);

criterion_main!(benches);
