//! Benchmarks for lot keyword matching and document preview truncation.
//!
//! Run with: cargo bench -p etl-core

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use etl_core::domain::{AttachmentRef, AttachmentType, Document, Lot};
use chrono::Utc;

fn make_lot(title_words: usize, description_words: usize) -> Lot {
  let title = (0..title_words).map(|i| format!("слово{i}")).collect::<Vec<_>>().join(" ");
  let description = (0..description_words)
    .map(|i| format!("поставка товара номер {i} по договору строительства"))
    .collect::<Vec<_>>()
    .join(" ");

  Lot {
    lot_id: "lot-bench".into(),
    title,
    description,
    amount: "1000000.00".into(),
    customer_bin: "123456789012".into(),
    attachment_refs: vec![AttachmentRef {
      url: "https://example.test/file.pdf".into(),
      declared_name: "file.pdf".into(),
      declared_type: AttachmentType::Pdf,
    }],
  }
}

fn make_document(content_len: usize) -> Document {
  Document {
    doc_id: 1,
    lot_id: "lot-bench".into(),
    file_name: "file.pdf".into(),
    file_type: AttachmentType::Pdf,
    content: "а".repeat(content_len),
    created_at: Utc::now(),
  }
}

fn bench_matches_keywords_by_keyword_count(c: &mut Criterion) {
  let mut group = c.benchmark_group("matches_keywords_by_keyword_count");
  let lot = make_lot(20, 200);

  for count in [0, 1, 5, 20].iter() {
    let keywords: Vec<String> = (0..*count).map(|i| format!("номер {i}")).collect();
    group.bench_with_input(BenchmarkId::from_parameter(count), &keywords, |b, keywords| {
      b.iter(|| lot.matches_keywords(black_box(keywords)));
    });
  }

  group.finish();
}

fn bench_matches_keywords_by_description_size(c: &mut Criterion) {
  let mut group = c.benchmark_group("matches_keywords_by_description_size");
  let keywords = vec!["договору строительства".to_string()];

  for words in [50, 500, 5000].iter() {
    let lot = make_lot(20, *words);
    group.throughput(Throughput::Bytes(lot.description.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(words), &lot, |b, lot| {
      b.iter(|| lot.matches_keywords(black_box(&keywords)));
    });
  }

  group.finish();
}

fn bench_preview(c: &mut Criterion) {
  let mut group = c.benchmark_group("document_preview");

  for content_len in [100, 10_000, 1_000_000].iter() {
    let doc = make_document(*content_len);
    group.throughput(Throughput::Bytes(doc.content.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(content_len), &doc, |b, doc| {
      b.iter(|| doc.preview());
    });
  }

  group.finish();
}

criterion_group!(
  benches,
  bench_matches_keywords_by_keyword_count,
  bench_matches_keywords_by_description_size,
  bench_preview
);
criterion_main!(benches);
