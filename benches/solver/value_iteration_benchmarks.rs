use arena_mdp::config::SolverConfig;
use arena_mdp::model::StateTable;
use arena_mdp::solver::{value_iteration, CompiledMdp};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_compile(c: &mut Criterion) {
    let table = StateTable::new();
    let config = SolverConfig::default();
    c.bench_function("compile_mdp", |b| {
        b.iter(|| CompiledMdp::build(black_box(&table), black_box(&config)))
    });
}

fn bench_value_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_iteration");
    group.sample_size(10);

    for discount in [0.9, 0.99, 0.999] {
        let config = SolverConfig {
            discount,
            ..SolverConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(discount), &config, |b, config| {
            b.iter(|| {
                let mut table = StateTable::new();
                value_iteration(&mut table, black_box(config)).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_value_iteration);
criterion_main!(benches);
