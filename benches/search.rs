//! Performance benchmarks for docshard
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use docshard::index::{IndexBuilder, IndexConfig, PlainTextExtractor};
use docshard::query::{MultiShardReader, SearchEngine, SearchOptions, SnippetBuilder};
use docshard::utils::{CancelToken, IndexLocator, ShardGroup};
use std::fs;
use tempfile::TempDir;

const WORDS: &[&str] = &[
    "harbor", "ledger", "invoice", "river", "quarterly", "report", "shipment", "customs",
    "warehouse", "contract", "audit", "budget", "forecast", "summary", "appendix",
];

/// Build an indexed tree of folders, split into several shards
fn create_benchmark_fixtures() -> (TempDir, ShardGroup) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("documents");

    for folder in 0..8 {
        for doc in 0..25 {
            let pages: Vec<String> = (0..4)
                .map(|page| {
                    (0..120)
                        .map(|i| WORDS[(folder * 7 + doc * 3 + page + i) % WORDS.len()])
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            let dir = root.join(format!("folder_{folder}"));
            fs::create_dir_all(&dir).expect("Failed to create folder");
            fs::write(dir.join(format!("doc_{doc}.txt")), pages.join("\x0c"))
                .expect("Failed to write document");
        }
    }

    let config = IndexConfig {
        shard_size_limit: 64 * 1024,
        ..IndexConfig::default()
    };
    let group = IndexLocator::new(temp_dir.path().join("indexes")).locate(&root);
    IndexBuilder::new(config, &PlainTextExtractor)
        .index_root(&group, &CancelToken::new())
        .expect("Failed to build index");

    (temp_dir, group)
}

fn bench_search(c: &mut Criterion) {
    let (_temp_dir, group) = create_benchmark_fixtures();
    let reader = MultiShardReader::open(&group).expect("Failed to open shards");
    let engine = SearchEngine::new(Default::default());

    let mut bench_group = c.benchmark_group("search");
    let cases = [
        ("single_word", "harbor", SearchOptions::default()),
        ("any_word", "invoice customs", SearchOptions::default()),
        (
            "phrase",
            "quarterly report",
            SearchOptions {
                whole_word: true,
                ..Default::default()
            },
        ),
        (
            "match_case",
            "ledger",
            SearchOptions {
                match_case: true,
                ..Default::default()
            },
        ),
    ];

    for (name, query, options) in &cases {
        bench_group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, q| {
            b.iter(|| engine.search_reader(&reader, black_box(q), options))
        });
    }
    bench_group.finish();
}

fn bench_shard_open(c: &mut Criterion) {
    let (_temp_dir, group) = create_benchmark_fixtures();

    c.bench_function("shard_group_open", |b| {
        b.iter(|| MultiShardReader::open(black_box(&group)))
    });
}

fn bench_snippet(c: &mut Criterion) {
    let text = WORDS.repeat(200).join(" ");
    let builder = SnippetBuilder::default();

    c.bench_function("snippet", |b| {
        b.iter(|| builder.build(black_box(&text), "appendix", false))
    });
}

criterion_group!(benches, bench_search, bench_shard_open, bench_snippet);

criterion_main!(benches);
