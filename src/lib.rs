//! # docshard - Sharded Document Search
//!
//! docshard indexes arbitrarily large trees of documents for full-text
//! search. A tree is partitioned into independently sized shards, each shard
//! is indexed incrementally and resumably, and queries are answered across
//! all shards of a tree at once with global BM25 ranking, deduplication and
//! highlighted snippets.
//!
//! ## Architecture
//!
//! - [`index`] - Partitioning, incremental building, segment files, compaction, metadata and checkpoints
//! - [`query`] - Multi-shard reading, scoring, top-k retrieval, snippets
//! - [`output`] - Terminal and JSON result rendering
//! - [`utils`] - Configuration, index location, tokenization, encoding, cancellation
//!
//! ## Quick Start
//!
//! ```ignore
//! use docshard::index::{IndexBuilder, IndexConfig, PlainTextExtractor};
//! use docshard::query::{SearchEngine, SearchOptions};
//! use docshard::utils::{CancelToken, IndexLocator};
//! use std::path::Path;
//!
//! let locator = IndexLocator::new("/var/lib/docshard");
//! let group = locator.locate(Path::new("/srv/documents"));
//!
//! let builder = IndexBuilder::new(IndexConfig::default(), &PlainTextExtractor);
//! builder.index_root(&group, &CancelToken::new()).unwrap();
//!
//! let engine = SearchEngine::new(Default::default());
//! for hit in engine.search(&group, "quarterly report", &SearchOptions::default()).unwrap() {
//!     println!("{}:{} {}", hit.path.display(), hit.page, hit.snippet);
//! }
//! ```
//!
//! ## On-disk layout
//!
//! Each indexed root owns a shard-group directory named by the SHA-256 of
//! the root path. It holds the group descriptor, the document metadata
//! snapshot, the resume checkpoint log and one directory per shard. A shard
//! is a list of immutable segments, each with stored pages, a sorted term
//! dictionary, varint-encoded postings and the document versions it
//! completed.

pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod utils;

pub use error::{Error, Result};
