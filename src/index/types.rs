use crate::query::scorer::ScoringWeights;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a page inside one segment
pub type PageId = u32;

/// Segment identifier (monotonic within a shard)
pub type SegmentId = u32;

/// Version of the shard descriptor format
pub const SHARD_FORMAT_VERSION: u32 = 2;

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Which documents under a shard root belong to the shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardScope {
    /// Every document beneath the folder
    Subtree,
    /// Only documents directly inside the folder (leftover of an oversized folder)
    TopLevel,
}

/// One unit of the partition: a folder and the scope of documents it covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardPlan {
    pub root: PathBuf,
    pub scope: ShardScope,
}

impl ShardPlan {
    pub fn subtree(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scope: ShardScope::Subtree,
        }
    }

    pub fn top_level(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scope: ShardScope::TopLevel,
        }
    }
}

/// A document discovered on disk, candidate for (re)indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// One page of one document, as written to a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub page: u32,
    /// Modification time of the document version this page was extracted from
    pub mtime: DateTime<Utc>,
    pub text: String,
}

/// A fully indexed version of one document.
///
/// Written to the segment that commits the document's last page, or on its
/// own when the version has no pages at all. The newest version of a path
/// across the whole group decides which of its pages are live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentVersion {
    pub path: PathBuf,
    pub mtime: DateTime<Utc>,
}

impl From<&DocumentEntry> for DocumentVersion {
    fn from(doc: &DocumentEntry) -> Self {
        Self {
            path: doc.path.clone(),
            mtime: doc.mtime,
        }
    }
}

impl From<&PageRecord> for DocumentVersion {
    fn from(page: &PageRecord) -> Self {
        Self {
            path: page.path.clone(),
            mtime: page.mtime,
        }
    }
}

/// Shard descriptor stored in `shard.json`.
///
/// Only segments listed here are part of the committed index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardMeta {
    pub version: u32,
    pub source: ShardPlan,
    pub segments: Vec<SegmentId>,
    pub page_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShardMeta {
    pub fn new(source: ShardPlan) -> Self {
        let now = Utc::now();
        Self {
            version: SHARD_FORMAT_VERSION,
            source,
            segments: Vec::new(),
            page_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn next_segment_id(&self) -> SegmentId {
        self.segments.iter().max().map_or(1, |id| id + 1)
    }
}

/// Configuration for the indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Cumulative document bytes above which a folder is split into several shards
    pub shard_size_limit: u64,
    /// Documents at or above this size are processed sequentially, one at a time
    pub large_document_threshold: u64,
    /// Worker threads for small documents (bounded to limit extractor memory)
    pub small_document_workers: usize,
    /// Pages handed to the writer per batch
    pub page_batch_size: usize,
    /// Pending pages that force a commit, including inside one large document
    pub commit_interval_pages: usize,
    /// Glob patterns selecting which files are documents; empty means every file
    pub include: Vec<String>,
    /// Share of superseded pages above which a shard is rewritten after a run
    pub compact_dead_ratio: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            shard_size_limit: 20 * GIB,
            large_document_threshold: 10 * MIB,
            small_document_workers: 2,
            page_batch_size: 100,
            commit_interval_pages: 2000,
            include: vec![
                "*.txt".to_string(),
                "*.text".to_string(),
                "*.md".to_string(),
            ],
            compact_dead_ratio: 0.25,
        }
    }
}

/// Configuration for query execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of hits taken from the index before filtering
    pub max_hits: usize,
    /// Characters of context kept before a snippet match
    pub snippet_chars_before: usize,
    /// Characters of context kept after a snippet match
    pub snippet_chars_after: usize,
    /// Scoring weights for result ranking
    pub scoring_weights: ScoringWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hits: 1000,
            snippet_chars_before: 50,
            snippet_chars_after: 100,
            scoring_weights: ScoringWeights::default(),
        }
    }
}

/// A ranked, snippet-annotated search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub page: u32,
    pub snippet: String,
    pub score: f32,
}
