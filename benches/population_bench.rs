//! Benchmarks for population throughput
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use std::sync::Arc;

use lifeline::core::calendar::timestamp;
use lifeline::core::config::EngineConfig;
use lifeline::engine::{CancelFlag, Executor};
use lifeline::person::attributes::{ETHNICITY, GENDER};
use lifeline::person::Person;
use lifeline::population::{Population, PopulationConfig};
use lifeline::registry::ModuleRegistry;

fn registry() -> Arc<ModuleRegistry> {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let registry = ModuleRegistry::new(EngineConfig::default());
    registry
        .load_lookup_tables(&fixtures.join("lookup_tables"))
        .expect("fixture tables");
    registry
        .load_directory(&fixtures.join("modules"))
        .expect("fixture modules");
    registry.preload().expect("fixture modules compile");
    Arc::new(registry)
}

fn bench_single_person(c: &mut Criterion) {
    let executor = Executor::new(registry());
    let birth = timestamp(1930, 6, 1);

    c.bench_function("person_90_years_all_modules", |b| {
        b.iter(|| {
            let mut person = Person::new(black_box(3), 42, birth)
                .with_attribute(GENDER, "F")
                .with_attribute(ETHNICITY, "irish");
            executor.enroll(&mut person, "lookuptable_test").unwrap();
            executor.enroll(&mut person, "diabetes_care").unwrap();
            executor.run(&mut person, timestamp(2020, 1, 1)).unwrap()
        })
    });
}

fn bench_population(c: &mut Criterion) {
    let registry = registry();
    let mut group = c.benchmark_group("population");
    group.sample_size(10);

    for workers in [1usize, 4] {
        let config = PopulationConfig {
            size: 500,
            seed: 1,
            workers,
            ..PopulationConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("500_people", workers), &config, |b, config| {
            b.iter(|| {
                Population::new(Arc::clone(&registry), config.clone())
                    .run(&CancelFlag::new())
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_person, bench_population);
criterion_main!(benches);
