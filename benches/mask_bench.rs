use criterion::{black_box, criterion_group, criterion_main, Criterion};

use libmem::mask::{MemoryType, NodeMask, TypeMask};
use libmem::{container_with_types, Allocator, Node};

fn fixture_nodes(n: u8) -> Vec<Node> {
    (0..n)
        .map(|id| {
            let kind = if id % 2 == 0 { MemoryType::Dram } else { MemoryType::Pmem };
            let distances = (0..n)
                .map(|other| {
                    if other == id {
                        0
                    } else if other / 4 == id / 4 {
                        10
                    } else {
                        20
                    }
                })
                .collect();
            Node::new(id, kind, 1 << 30, id % 4 != 0, Default::default(), distances)
        })
        .collect()
}

fn mask_ops(c: &mut Criterion) {
    let a = NodeMask::parse("0-31,40-55").unwrap();
    let b = NodeMask::parse("10-45").unwrap();
    c.bench_function("nodemask_union_intersection", |bencher| {
        bencher.iter(|| {
            let u = black_box(a).union(&black_box(b));
            let i = black_box(a).intersection(&black_box(b));
            black_box(u.union(&i))
        })
    });

    c.bench_function("nodemask_memset_string", |bencher| {
        bencher.iter(|| black_box(a).memset_string())
    });
}

fn allocate_bench(c: &mut Criterion) {
    c.bench_function("allocate_32_nodes", |bencher| {
        bencher.iter(|| {
            let mut allocator = Allocator::builder()
                .with_nodes(fixture_nodes(32))
                .unwrap()
                .build()
                .unwrap();
            for i in 0..16u32 {
                let id = format!("req-{i}");
                let affinity = NodeMask::single((i % 32) as u8);
                let _ = allocator.allocate(black_box(container_with_types(
                    id,
                    "bench",
                    1 << 20,
                    affinity,
                    TypeMask::single(MemoryType::Dram),
                )));
            }
            black_box(allocator.version())
        })
    });
}

criterion_group!(benches, mask_ops, allocate_bench);
criterion_main!(benches);
