//! End-to-end search tests across shard-groups.

mod common;

use common::Fixture;
use docshard::Error;
use docshard::index::{IndexBuilder, IndexConfig, PlainTextExtractor};
use docshard::query::{SearchEngine, SearchOptions};
use docshard::utils::CancelToken;
use std::fs;

const T0: u64 = 1_700_000_000;

fn index(fixture: &Fixture, config: IndexConfig) {
    let extractor = PlainTextExtractor;
    IndexBuilder::new(config, &extractor)
        .index_root(&fixture.group(), &CancelToken::new())
        .unwrap();
}

fn split_config() -> IndexConfig {
    IndexConfig {
        shard_size_limit: 120,
        ..IndexConfig::default()
    }
}

/// Two folders that end up in separate shards, each mentioning "harbor"
fn two_shard_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.write(
        "north/log.txt",
        "The harbor froze early this year.\x0cNo ships left the harbor until spring.",
        T0,
    );
    fixture.write("north/misc.txt", "Nothing of note was recorded here at all.", T0);
    fixture.write("south/report.txt", "A new harbor crane was installed in the south.", T0);
    fixture.write("south/extra.txt", "Inventory counts for the warehouse were taken.", T0);
    index(&fixture, split_config());
    fixture
}

#[test]
fn test_results_merged_across_shards() {
    let fixture = two_shard_fixture();
    let group = fixture.group();
    assert!(group.shard_dirs().unwrap().len() >= 2);

    let results = SearchEngine::new(Default::default())
        .search(&group, "harbor", &SearchOptions::default())
        .unwrap();

    let mut hits: Vec<(String, u32)> = results
        .iter()
        .map(|r| (r.rel_path.to_string_lossy().replace('\\', "/"), r.page))
        .collect();
    hits.sort();
    assert_eq!(
        hits,
        vec![
            ("north/log.txt".to_string(), 1),
            ("north/log.txt".to_string(), 2),
            ("south/report.txt".to_string(), 1),
        ]
    );

    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(results.iter().all(|r| r.snippet.contains("<b>harbor</b>")));
}

#[test]
fn test_snippet_highlights_match_with_context() {
    let fixture = Fixture::new();
    let before = "a".repeat(80);
    let after = "z".repeat(300);
    fixture.write("doc.txt", &format!("{before} the quick brown fox {after}"), T0);
    index(&fixture, IndexConfig::default());

    let results = SearchEngine::new(Default::default())
        .search(&fixture.group(), "brown", &SearchOptions::default())
        .unwrap();
    assert_eq!(results.len(), 1);

    let snippet = &results[0].snippet;
    assert!(snippet.contains("<b>brown</b>"));
    let plain = snippet.replace("<b>", "").replace("</b>", "");
    assert_eq!(plain.chars().count(), 50 + "brown".len() + 100);
}

#[test]
fn test_duplicate_pages_collapsed() {
    let fixture = Fixture::new();
    fixture.write("doc.txt", "lighthouse keeper notes", T0);
    // Keep both copies on disk instead of compacting them away
    let config = IndexConfig {
        compact_dead_ratio: 2.0,
        ..IndexConfig::default()
    };
    index(&fixture, config.clone());

    // Losing the metadata snapshot makes the next run index the same version again
    let group = fixture.group();
    fs::remove_file(group.metadata_path()).unwrap();
    index(&fixture, config);

    let results = SearchEngine::new(Default::default())
        .search(&group, "lighthouse", &SearchOptions::default())
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].page, 1);
}

#[test]
fn test_path_filter() {
    let fixture = two_shard_fixture();
    let filter = fixture.root.join("SOUTH").to_string_lossy().into_owned();
    let options = SearchOptions {
        path_filter: Some(filter),
        ..Default::default()
    };

    let results = SearchEngine::new(Default::default())
        .search(&fixture.group(), "harbor", &options)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].path.ends_with("south/report.txt"));
}

#[test]
fn test_unknown_term_returns_empty() {
    let fixture = two_shard_fixture();
    let results = SearchEngine::new(Default::default())
        .search(&fixture.group(), "zeppelin", &SearchOptions::default())
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_never_indexed_root_is_not_found() {
    let fixture = Fixture::new();
    let result = SearchEngine::new(Default::default()).search(
        &fixture.group(),
        "anything",
        &SearchOptions::default(),
    );
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_corrupt_shard_skipped_then_no_usable_shards() {
    let fixture = two_shard_fixture();
    let group = fixture.group();
    let shards = group.shard_dirs().unwrap();
    let engine = SearchEngine::new(Default::default());

    fs::write(shards[0].join("shard.json"), "corrupted").unwrap();
    let partial = engine
        .search(&group, "harbor", &SearchOptions::default())
        .unwrap();
    assert!(!partial.is_empty());

    for shard in &shards {
        fs::write(shard.join("shard.json"), "corrupted").unwrap();
    }
    let result = engine.search(&group, "harbor", &SearchOptions::default());
    assert!(matches!(result, Err(Error::NoUsableShards(_))));
}

#[test]
fn test_whole_word_and_case() {
    let fixture = Fixture::new();
    fixture.write("a.txt", "Portable Document Format files", T0);
    fixture.write("b.txt", "the document format is portable", T0);
    fixture.write("c.txt", "documents formatted nicely", T0);
    index(&fixture, IndexConfig::default());
    let group = fixture.group();
    let engine = SearchEngine::new(Default::default());

    let phrase = SearchOptions {
        whole_word: true,
        ..Default::default()
    };
    let results = engine.search(&group, "document format", &phrase).unwrap();
    let mut names: Vec<_> = results
        .iter()
        .map(|r| r.rel_path.to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let exact = SearchOptions {
        whole_word: true,
        match_case: true,
        ..Default::default()
    };
    let results = engine.search(&group, "Document Format", &exact).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rel_path.to_string_lossy(), "a.txt");
    assert_eq!(results[0].snippet, "Portable <b>Document Format</b> files");
}
