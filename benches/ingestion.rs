use std::hint::black_box;
use std::io::Write;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tabular_ingest::ingestion::{ingest_from_path, IngestionOptions};
use tabular_ingest::query::Operator;
use tabular_ingest::store::InMemoryStore;
use tabular_ingest::types::Value;
use tabular_ingest::value_type::find_data_type_for_value;

const ROWS: usize = 20_000;

fn write_csv(rows: usize) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(f, "id,name,score,active,joined").unwrap();
    for i in 0..rows {
        writeln!(
            f,
            "{i},user-{i},{}.{},{},2024-01-{:02}T00:00:00.000Z",
            i % 100,
            i % 10,
            i % 2 == 0,
            i % 28 + 1
        )
        .unwrap();
    }
    f.flush().unwrap();
    f
}

fn bench_csv_ingest(c: &mut Criterion) {
    let file = write_csv(ROWS);
    let mut group = c.benchmark_group("ingest_csv");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.sample_size(10);

    for batch_size in [500, 5_000] {
        let mut options = IngestionOptions::default();
        options.config.batch_size = batch_size;
        group.bench_function(format!("batch_{batch_size}"), |b| {
            b.iter_batched(
                InMemoryStore::new,
                |store| {
                    let summary = ingest_from_path(file.path(), "bench", &store, &options).unwrap();
                    black_box(summary.rows)
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let samples = ["42", "1,234.50", "true", "2024-01-02T03:04:05.000Z", "{\"a\": 1}", "[1, 2, 3]", "plain"];
    c.bench_function("find_data_type_for_value", |b| {
        b.iter(|| {
            for s in samples {
                black_box(find_data_type_for_value(black_box(s)));
            }
        })
    });
}

fn bench_operators(c: &mut Criterion) {
    let lhs = [
        Value::Int64(30),
        Value::text("Report (Final).xlsx"),
        Value::Null,
        Value::Array(vec![Value::text("a"), Value::text("b")]),
    ];
    let rhs = [Value::text("29"), Value::text("final"), Value::Array(vec![Value::text("b")])];
    c.bench_function("operator_evaluate_all", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for op in Operator::ALL {
                for l in &lhs {
                    for r in &rhs {
                        hits += usize::from(op.evaluate(l, r));
                    }
                }
            }
            black_box(hits)
        })
    });
}

criterion_group!(benches, bench_csv_ingest, bench_inference, bench_operators);
criterion_main!(benches);
