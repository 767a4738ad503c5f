use criterion::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sylva::{DependencyIndex, Key};

fn random_index(keys: i32, edges: usize) -> DependencyIndex {
    let mut rng = StdRng::seed_from_u64(1);
    let mut deps = DependencyIndex::new();
    for _ in 0..edges {
        deps.add_dependency(Key(rng.gen_range(0..keys)), Key(rng.gen_range(0..keys)));
    }
    deps
}

fn transitive_dependents(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive dependents");

    for log_keys in (8..=16).step_by(4) {
        let keys = 1 << log_keys;
        for edges_per_key in [1, 2] {
            let deps = random_index(keys, keys as usize * edges_per_key);
            let seeds: Vec<Key> = (0..16).map(Key).collect();

            group.bench_with_input(
                BenchmarkId::new(format!("{edges_per_key} edges per key"), format!("{keys} keys")),
                &(deps, seeds),
                |b, (deps, seeds)| {
                    b.iter(|| deps.transitive_dependents(seeds.iter().copied()).len());
                },
            );
        }
    }
}

criterion_group!(benches, transitive_dependents);
criterion_main!(benches);
