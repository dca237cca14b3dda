use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sketch::{band_sketch, sketch_bag, Bag, SketchConfig, SketchParams};

fn synthetic_bag(support: usize, seed: u64) -> Bag {
    let mut rng = StdRng::seed_from_u64(seed);
    Bag::from_entries(
        (0..support as u64)
            .map(|token| (token * 7, rng.gen_range(0.1..4.0)))
            .collect(),
    )
}

fn sketch_bench(c: &mut Criterion) {
    let cfg = SketchConfig::default();
    let params = SketchParams::new(&cfg);

    let mut group = c.benchmark_group("sketch_bag");
    for support in [16usize, 64, 256, 1024] {
        let bag = synthetic_bag(support, 7);
        group.throughput(Throughput::Elements(support as u64));
        group.bench_with_input(BenchmarkId::from_parameter(support), &bag, |b, bag| {
            b.iter(|| {
                let sketch = sketch_bag(black_box(bag), &params);
                black_box(sketch);
            });
        });
    }
    group.finish();
}

fn band_bench(c: &mut Criterion) {
    let cfg = SketchConfig::default();
    let params = SketchParams::new(&cfg);
    let sketch = sketch_bag(&synthetic_bag(256, 11), &params);

    c.bench_function("band_sketch_128_rows", |b| {
        b.iter(|| {
            let banded = band_sketch(black_box(&sketch), &cfg).expect("bench banding");
            black_box(banded);
        });
    });
}

fn agreement_bench(c: &mut Criterion) {
    let cfg = SketchConfig::default();
    let params = SketchParams::new(&cfg);
    let a = sketch_bag(&synthetic_bag(256, 11), &params);
    let b = sketch_bag(&synthetic_bag(256, 13), &params);

    c.bench_function("sketch_agreement", |bench| {
        bench.iter(|| {
            let estimate = black_box(&a).agreement(black_box(&b)).expect("bench agreement");
            black_box(estimate);
        });
    });
}

criterion_group!(benches, sketch_bench, band_bench, agreement_bench);
criterion_main!(benches);
