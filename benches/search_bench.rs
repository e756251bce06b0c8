// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks a single-shard substring search against a small synthetic
//! corpus, the same shape of workload the shard searcher's cost-tiered
//! driver loop is tuned for.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::sync::Arc;

use trigrep::build::{InputDocument, ShardBuilder};
use trigrep::query::Query;
use trigrep::search::{self, SearchOptions};
use trigrep::shard::Shard;

fn build_corpus_shard(doc_count: usize) -> Arc<Shard> {
    let mut builder = ShardBuilder::new("bench-corpus", vec!["HEAD".to_string()]);
    for i in 0..doc_count {
        let content = format!(
            "fn handler_{i}() {{\n    let needle = connect_database();\n    println!(\"{{}}\", needle);\n}}\n"
        );
        builder.add_document(InputDocument::new(format!("src/handler_{i}.rs"), content.into_bytes(), 1));
    }
    Shard::open_bytes(builder.build()).expect("synthetic corpus shard must be well-formed")
}

fn bench_substring_search(c: &mut Criterion) {
    let shard = build_corpus_shard(2_000);
    let options = SearchOptions::default();

    c.bench_function("substring_search_2000_docs", |b| {
        b.iter(|| {
            let result = search::search(&shard, Query::substring("connect_database"), &options, None).unwrap();
            black_box(result.files.len())
        });
    });
}

criterion_group!(benches, bench_substring_search);
criterion_main!(benches);
