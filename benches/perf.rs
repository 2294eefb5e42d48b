use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ristrettodb::{Table, Value};
use tempfile::tempdir;

/// Sustained single-writer append throughput: the engine's stated envelope
/// is >1M rows/sec, <1 µs/row (spec §1) for an in-mapping append that does
/// not trigger a grow or a flush.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    group.bench_function("append_integer_row", |b| {
        let dir = tempdir().unwrap();
        let mut table =
            Table::create(dir.path(), "bench", "CREATE TABLE bench (id INTEGER, v REAL)").unwrap();
        let mut i = 0i64;
        b.iter(|| {
            table
                .append(&[Value::Integer(i), Value::Real(i as f64)])
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("append_text_row", |b| {
        let dir = tempdir().unwrap();
        let mut table = Table::create(
            dir.path(),
            "bench_text",
            "CREATE TABLE bench_text (id INTEGER, data TEXT(32))",
        )
        .unwrap();
        let mut i = 0i64;
        b.iter_batched(
            || Value::Text(b"the quick brown fox".to_vec()),
            |data| {
                table.append(&[Value::Integer(i), data]).unwrap();
                i += 1;
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut table =
        Table::create(dir.path(), "scan", "CREATE TABLE scan (id INTEGER, v REAL)").unwrap();
    for i in 0..100_000i64 {
        table
            .append(&[Value::Integer(i), Value::Real(i as f64)])
            .unwrap();
    }

    c.bench_function("scan_100k_rows", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            table
                .select(|row| {
                    if let Value::Integer(id) = &row[0] {
                        sum += *id;
                    }
                })
                .unwrap();
            sum
        });
    });
}

criterion_group!(benches, bench_append, bench_scan);
criterion_main!(benches);
