//! Rewriting shards without pages that search can no longer return.
//!
//! Re-indexing a modified document appends its new version and leaves the
//! old pages hidden in earlier segments; documents removed from disk leave
//! all of their pages behind. Compaction copies the remaining pages of a
//! shard into fresh segments and swaps them in with one descriptor write.

use crate::error::{Error, Result};
use crate::index::build::IndexRun;
use crate::index::metadata::IndexMetadataStore;
use crate::index::types::{DocumentVersion, IndexConfig, PageRecord, ShardPlan};
use crate::index::writer::ShardWriter;
use crate::query::{MultiShardReader, PageAddress};
use crate::utils::ShardGroup;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of compacting a shard-group
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactReport {
    /// Shards that were rewritten
    pub shards: usize,
    pub pages_kept: usize,
    pub pages_removed: usize,
}

/// What one shard would keep
struct ShardSurvey {
    pages: Vec<PageAddress>,
    documents: Vec<DocumentVersion>,
    total: usize,
    /// Live pages of documents no longer indexed
    orphaned: usize,
}

impl ShardSurvey {
    fn dead(&self) -> usize {
        self.total - self.pages.len()
    }
}

pub struct Compactor<'a> {
    metadata: &'a IndexMetadataStore,
    min_dead_ratio: f64,
    segment_pages: usize,
}

impl<'a> Compactor<'a> {
    /// Pages of documents missing from `metadata` are always dropped
    pub fn new(metadata: &'a IndexMetadataStore, config: &IndexConfig) -> Self {
        Self {
            metadata,
            min_dead_ratio: config.compact_dead_ratio,
            segment_pages: config.commit_interval_pages.max(1),
        }
    }

    /// Rewrite every shard holding at least one dead page
    pub fn force(mut self) -> Self {
        self.min_dead_ratio = 0.0;
        self
    }

    pub fn compact_group(&self, group: &ShardGroup) -> Result<CompactReport> {
        let reader = match MultiShardReader::open(group) {
            Ok(reader) => reader,
            Err(Error::NotFound(_) | Error::NoUsableShards(_)) => return Ok(CompactReport::default()),
            Err(e) => return Err(e),
        };

        let mut report = CompactReport::default();
        let mut rewritten: Vec<(PathBuf, ShardPlan)> = Vec::new();

        for shard_idx in 0..reader.shards().len() {
            let survey = self.survey(&reader, shard_idx);
            if !self.should_rewrite(&survey) {
                continue;
            }

            let shard = &reader.shards()[shard_idx];
            let source = shard.meta().source.clone();
            self.rewrite(&reader, shard.dir(), &source, &survey)?;

            info!(
                shard = ?shard.dir(),
                kept = survey.pages.len(),
                removed = survey.dead(),
                "Compacted shard"
            );
            report.shards += 1;
            report.pages_kept += survey.pages.len();
            report.pages_removed += survey.dead();
            rewritten.push((shard.dir().to_path_buf(), source));
        }

        // Old segments are only deleted once no reader maps them
        drop(reader);
        for (dir, source) in &rewritten {
            ShardWriter::open(dir, source)?;
        }

        Ok(report)
    }

    fn should_rewrite(&self, survey: &ShardSurvey) -> bool {
        let dead = survey.dead();
        if dead == 0 {
            return false;
        }
        survey.orphaned > 0 || dead as f64 / survey.total as f64 >= self.min_dead_ratio
    }

    fn survey(&self, reader: &MultiShardReader, shard_idx: usize) -> ShardSurvey {
        let shard = &reader.shards()[shard_idx];
        let mut seen: FxHashSet<(&Path, u32)> = FxHashSet::default();
        let mut pages = Vec::new();
        let mut total = 0;
        let mut orphaned = 0;

        for (segment_idx, segment) in shard.segments().iter().enumerate() {
            for (page_idx, header) in segment.pages().iter().enumerate() {
                total += 1;
                let address = PageAddress {
                    shard: shard_idx as u32,
                    segment: segment_idx as u32,
                    page: page_idx as u32,
                };
                if !reader.is_live(address) {
                    continue;
                }
                if self.metadata.get(&header.path).is_none() {
                    orphaned += 1;
                    continue;
                }
                // Same version indexed twice
                if seen.insert((header.path.as_path(), header.page)) {
                    pages.push(address);
                }
            }
        }

        let mut kept_docs: FxHashSet<&Path> = FxHashSet::default();
        let documents = shard
            .segments()
            .iter()
            .flat_map(|s| s.documents())
            .filter(|doc| {
                reader.newest_version(&doc.path) == Some(doc.mtime)
                    && self.metadata.get(&doc.path).is_some()
                    && kept_docs.insert(doc.path.as_path())
            })
            .cloned()
            .collect();

        ShardSurvey {
            pages,
            documents,
            total,
            orphaned,
        }
    }

    fn rewrite(
        &self,
        reader: &MultiShardReader,
        dir: &Path,
        source: &ShardPlan,
        survey: &ShardSurvey,
    ) -> Result<()> {
        let mut writer = ShardWriter::open(dir, source)?;
        let mut segments = Vec::new();
        let mut kept = 0u64;

        // A shard left with only empty versions still needs their markers
        let chunks: Vec<&[PageAddress]> = if survey.pages.is_empty() {
            vec![&survey.pages[..]]
        } else {
            survey.pages.chunks(self.segment_pages).collect()
        };
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut records = Vec::with_capacity(chunk.len());
            for &address in chunk {
                let (Some(header), Some(text)) = (reader.page(address), reader.text(address)) else {
                    continue;
                };
                records.push(PageRecord {
                    path: header.path.clone(),
                    rel_path: header.rel_path.clone(),
                    page: header.page,
                    mtime: header.mtime,
                    text: text.to_string(),
                });
            }

            let documents: &[DocumentVersion] = if i == last { &survey.documents } else { &[] };
            if records.is_empty() && documents.is_empty() {
                continue;
            }
            kept += records.len() as u64;
            segments.push(writer.write_detached(&records, documents)?);
        }

        debug!(shard = ?dir, segments = segments.len(), "Swapping compacted segments");
        writer.replace_segments(segments, kept)
    }
}

/// Compact a group outside an indexing run, dropping every dead page.
///
/// Documents completed by an interrupted run are read from its checkpoint
/// so their pages survive.
pub fn compact_root(group: &ShardGroup, config: &IndexConfig) -> Result<CompactReport> {
    if !group.exists() {
        return Err(Error::NotFound(group.root.clone()));
    }
    let run = IndexRun::begin(group)?;
    Compactor::new(run.metadata(), config).force().compact_group(group)
}
