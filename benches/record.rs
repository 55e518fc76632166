//! Criterion benchmarks for the record's save path.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use schizoid::path;
use schizoid::record::Recorder;

/// Saves one trial's worth of fields under nested prefixes.
fn bench_scoped_saves(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped_save");

    for trials in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*trials as u64));

        group.bench_with_input(BenchmarkId::new("trials", trials), trials, |b, &trials| {
            b.iter(|| {
                let mut rec = Recorder::new();
                rec.enter_scope("block1");
                for trial in 0..trials {
                    rec.enter_scope(path!["trial", trial]);
                    rec.save("rt", 0.412).unwrap();
                    rec.save("choice", "left").unwrap();
                    rec.save(path!["times", 0], 1.5).unwrap();
                    rec.exit_scope();
                }
                rec.exit_scope();
                black_box(rec.into_store())
            });
        });
    }

    group.finish();
}

/// Repeated writes to an existing leaf hit the first-write-wins check only.
fn bench_repeated_save(c: &mut Criterion) {
    let mut rec = Recorder::new();
    rec.save(path!["sys", "resolution"], "800x600").unwrap();

    c.bench_function("repeated_save", |b| {
        b.iter(|| rec.save(black_box(path!["sys", "resolution"]), "1024x768").unwrap());
    });
}

criterion_group!(benches, bench_scoped_saves, bench_repeated_save);
criterion_main!(benches);
