//! Several shard indexes composed into one logical index.

use crate::error::{Error, Result};
use crate::index::reader::{PageHeader, ShardReader};
use crate::index::types::PageId;
use crate::index::writer::SHARD_META_FILE;
use crate::utils::ShardGroup;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Location of one page across all shards of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageAddress {
    pub shard: u32,
    pub segment: u32,
    pub page: PageId,
}

/// Read-only union of every usable shard of a shard-group.
///
/// A document re-indexed after modification leaves its older pages behind in
/// earlier segments (possibly of another shard). Only pages of the newest
/// completed version of each document are live; the rest are hidden from
/// postings and statistics. A version that extracted to no pages hides every
/// older page of its document.
pub struct MultiShardReader {
    shards: Vec<ShardReader>,
    newest: FxHashMap<PathBuf, DateTime<Utc>>,
    live: Vec<Vec<RoaringBitmap>>,
    live_pages: u64,
    avg_page_len: f32,
}

impl MultiShardReader {
    /// Open every shard of a group, skipping shards that fail to open
    pub fn open(group: &ShardGroup) -> Result<Self> {
        let dirs: Vec<_> = group
            .shard_dirs()?
            .into_iter()
            .filter(|dir| dir.join(SHARD_META_FILE).exists())
            .collect();
        if dirs.is_empty() {
            return Err(Error::NotFound(group.dir.clone()));
        }

        let shards: Vec<ShardReader> = dirs
            .par_iter()
            .filter_map(|dir| match ShardReader::open(dir) {
                Ok(reader) => Some(reader),
                Err(e) => {
                    warn!(shard = ?dir, error = %e, "Skipping unusable shard");
                    None
                }
            })
            .collect();

        if shards.is_empty() {
            return Err(Error::NoUsableShards(group.dir.clone()));
        }

        debug!(group = ?group.dir, shards = shards.len(), "Opened shard-group");
        Ok(Self::from_shards(shards))
    }

    pub fn from_shards(shards: Vec<ShardReader>) -> Self {
        let mut newest: FxHashMap<PathBuf, DateTime<Utc>> = FxHashMap::default();
        for doc in shards.iter().flat_map(|s| s.segments()).flat_map(|s| s.documents()) {
            newest
                .entry(doc.path.clone())
                .and_modify(|mtime| *mtime = (*mtime).max(doc.mtime))
                .or_insert(doc.mtime);
        }

        let mut live_pages = 0u64;
        let mut live_tokens = 0u64;
        let live: Vec<Vec<RoaringBitmap>> = shards
            .iter()
            .map(|shard| {
                shard
                    .segments()
                    .iter()
                    .map(|segment| {
                        let mut bitmap = RoaringBitmap::new();
                        for (id, page) in segment.pages().iter().enumerate() {
                            if newest.get(page.path.as_path()) == Some(&page.mtime) {
                                bitmap.insert(id as u32);
                                live_pages += 1;
                                live_tokens += page.token_count as u64;
                            }
                        }
                        bitmap
                    })
                    .collect()
            })
            .collect();

        let avg_page_len = if live_pages > 0 {
            live_tokens as f32 / live_pages as f32
        } else {
            0.0
        };

        Self {
            shards,
            newest,
            live,
            live_pages,
            avg_page_len,
        }
    }

    /// Modification time of the newest completed version of a document
    pub fn newest_version(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.newest.get(path).copied()
    }

    pub fn shards(&self) -> &[ShardReader] {
        &self.shards
    }

    /// Pages visible to search
    pub fn page_count(&self) -> u64 {
        self.live_pages
    }

    pub fn avg_page_len(&self) -> f32 {
        self.avg_page_len
    }

    pub fn is_live(&self, address: PageAddress) -> bool {
        self.live
            .get(address.shard as usize)
            .and_then(|segments| segments.get(address.segment as usize))
            .is_some_and(|bitmap| bitmap.contains(address.page))
    }

    pub fn page(&self, address: PageAddress) -> Option<&PageHeader> {
        self.shards
            .get(address.shard as usize)?
            .segments()
            .get(address.segment as usize)?
            .page(address.page)
    }

    pub fn text(&self, address: PageAddress) -> Option<&str> {
        self.shards
            .get(address.shard as usize)?
            .segments()
            .get(address.segment as usize)?
            .text(address.page)
    }

    /// Live `(page, term_freq)` postings of a case-folded term over all shards
    pub fn postings(&self, term: &str) -> Vec<(PageAddress, u32)> {
        let mut result = Vec::new();
        for (shard_idx, shard) in self.shards.iter().enumerate() {
            for (segment_idx, segment) in shard.segments().iter().enumerate() {
                let live = &self.live[shard_idx][segment_idx];
                result.extend(
                    segment
                        .postings(term)
                        .into_iter()
                        .filter(|(page, _)| live.contains(*page))
                        .map(|(page, tf)| {
                            (
                                PageAddress {
                                    shard: shard_idx as u32,
                                    segment: segment_idx as u32,
                                    page,
                                },
                                tf,
                            )
                        }),
                );
            }
        }
        result
    }

    /// Live pages containing a case-folded term
    pub fn doc_freq(&self, term: &str) -> u32 {
        self.postings(term).len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{DocumentVersion, PageRecord, ShardPlan};
    use crate::index::writer::ShardWriter;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn page(path: &str, page: u32, secs: i64, text: &str) -> PageRecord {
        PageRecord {
            path: PathBuf::from(path),
            rel_path: PathBuf::from(path.trim_start_matches('/')),
            page,
            mtime: Utc.timestamp_opt(secs, 0).unwrap(),
            text: text.to_string(),
        }
    }

    /// Add pages together with the document versions they complete
    fn add_complete(writer: &mut ShardWriter, pages: Vec<PageRecord>) {
        for page in &pages {
            writer.add_document(DocumentVersion::from(page));
        }
        writer.add_pages(pages);
    }

    fn write_shard(dir: &Path, pages: Vec<PageRecord>) {
        let mut writer = ShardWriter::open(dir, &ShardPlan::subtree("/docs")).unwrap();
        add_complete(&mut writer, pages);
        writer.commit().unwrap();
    }

    #[test]
    fn test_missing_group_is_not_found() {
        let temp = tempdir().unwrap();
        let group = ShardGroup {
            root: PathBuf::from("/docs"),
            dir: temp.path().join("absent"),
        };
        assert!(matches!(MultiShardReader::open(&group), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_group_without_shards_is_not_found() {
        let temp = tempdir().unwrap();
        let group = ShardGroup {
            root: PathBuf::from("/docs"),
            dir: temp.path().to_path_buf(),
        };
        fs::create_dir_all(temp.path().join("never-committed")).unwrap();
        assert!(matches!(MultiShardReader::open(&group), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_all_shards_corrupt() {
        let temp = tempdir().unwrap();
        let shard_dir = temp.path().join("broken");
        fs::create_dir_all(&shard_dir).unwrap();
        fs::write(shard_dir.join(SHARD_META_FILE), "{not json").unwrap();

        let group = ShardGroup {
            root: PathBuf::from("/docs"),
            dir: temp.path().to_path_buf(),
        };
        assert!(matches!(
            MultiShardReader::open(&group),
            Err(Error::NoUsableShards(_))
        ));
    }

    #[test]
    fn test_corrupt_shard_skipped() {
        let temp = tempdir().unwrap();
        write_shard(&temp.path().join("good"), vec![page("/docs/a.txt", 1, 10, "alpha")]);
        let broken = temp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(SHARD_META_FILE), "garbage").unwrap();

        let group = ShardGroup {
            root: PathBuf::from("/docs"),
            dir: temp.path().to_path_buf(),
        };
        let reader = MultiShardReader::open(&group).unwrap();
        assert_eq!(reader.shards().len(), 1);
        assert_eq!(reader.doc_freq("alpha"), 1);
    }

    #[test]
    fn test_statistics_span_shards() {
        let temp = tempdir().unwrap();
        write_shard(
            &temp.path().join("one"),
            vec![page("/docs/a.txt", 1, 10, "common rare")],
        );
        write_shard(
            &temp.path().join("two"),
            vec![page("/docs/b.txt", 1, 10, "common words here")],
        );

        let group = ShardGroup {
            root: PathBuf::from("/docs"),
            dir: temp.path().to_path_buf(),
        };
        let reader = MultiShardReader::open(&group).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert_eq!(reader.avg_page_len(), 2.5);
        assert_eq!(reader.doc_freq("common"), 2);
        assert_eq!(reader.doc_freq("rare"), 1);
    }

    #[test]
    fn test_older_versions_hidden() {
        let temp = tempdir().unwrap();
        let shard_dir = temp.path().join("shard");
        let mut writer = ShardWriter::open(&shard_dir, &ShardPlan::subtree("/docs")).unwrap();
        add_complete(&mut writer, vec![page("/docs/a.txt", 1, 10, "old wording")]);
        writer.commit().unwrap();
        add_complete(&mut writer, vec![page("/docs/a.txt", 1, 20, "new wording")]);
        writer.commit().unwrap();

        let reader = MultiShardReader::from_shards(vec![ShardReader::open(&shard_dir).unwrap()]);
        assert_eq!(reader.page_count(), 1);
        assert!(reader.postings("old").is_empty());

        let hits = reader.postings("wording");
        assert_eq!(hits.len(), 1);
        assert_eq!(reader.text(hits[0].0), Some("new wording"));
        assert!(!reader.is_live(PageAddress {
            shard: 0,
            segment: 0,
            page: 0
        }));
    }

    #[test]
    fn test_version_without_pages_hides_older_pages() {
        let temp = tempdir().unwrap();
        let shard_dir = temp.path().join("shard");
        let mut writer = ShardWriter::open(&shard_dir, &ShardPlan::subtree("/docs")).unwrap();
        add_complete(&mut writer, vec![page("/docs/a.txt", 1, 10, "confidential budget")]);
        writer.commit().unwrap();
        writer.add_document(DocumentVersion {
            path: PathBuf::from("/docs/a.txt"),
            mtime: Utc.timestamp_opt(20, 0).unwrap(),
        });
        writer.commit().unwrap();

        let reader = MultiShardReader::from_shards(vec![ShardReader::open(&shard_dir).unwrap()]);
        assert_eq!(reader.page_count(), 0);
        assert!(reader.postings("confidential").is_empty());
        assert_eq!(
            reader.newest_version(Path::new("/docs/a.txt")),
            Some(Utc.timestamp_opt(20, 0).unwrap())
        );
    }

    #[test]
    fn test_pages_of_unfinished_version_hidden() {
        let temp = tempdir().unwrap();
        let shard_dir = temp.path().join("shard");
        let mut writer = ShardWriter::open(&shard_dir, &ShardPlan::subtree("/docs")).unwrap();
        add_complete(&mut writer, vec![page("/docs/a.txt", 1, 10, "finished draft")]);
        writer.commit().unwrap();
        // Committed mid-document, never completed
        writer.add_pages(vec![page("/docs/a.txt", 1, 20, "partial rewrite")]);
        writer.commit().unwrap();

        let reader = MultiShardReader::from_shards(vec![ShardReader::open(&shard_dir).unwrap()]);
        assert_eq!(reader.doc_freq("finished"), 1);
        assert!(reader.postings("partial").is_empty());
    }
}
