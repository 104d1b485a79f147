//! Benchmarks for vector-hit ordering, the hot path the Query Service runs on every
//! `top_k` result set before hydrating them from the relational store.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use db::vector::{VectorHit, order_hits};
use etl_core::EmbeddingMetadata;

fn make_hits(n: usize) -> Vec<VectorHit> {
  (0..n)
    .map(|i| VectorHit {
      vector_id: format!("etl_doc:{i}"),
      score: ((n - i) % 7) as f32 / 7.0,
      metadata: EmbeddingMetadata {
        doc_id: i as i64,
        file_name: format!("doc-{i}.pdf"),
        lot_id: "lot-1".into(),
        source: "etl_documents".into(),
      },
    })
    .collect()
}

fn bench_order_hits(c: &mut Criterion) {
  let mut group = c.benchmark_group("order_hits");
  for size in [10usize, 50, 200] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter_batched(
        || make_hits(size),
        |mut hits| order_hits(black_box(&mut hits)),
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

criterion_group!(benches, bench_order_hits);
criterion_main!(benches);
