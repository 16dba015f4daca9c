use crate::error::{Error, Result};
use crate::index::types::*;
use crate::utils::{Analyzer, encode_postings, tokenize, write_json_atomic, write_str};
use chrono::Utc;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) const SHARD_META_FILE: &str = "shard.json";
pub(crate) const PAGES_FILE: &str = "pages.bin";
pub(crate) const TERMS_DICT_FILE: &str = "terms.dict";
pub(crate) const TERMS_POSTINGS_FILE: &str = "terms.postings";
pub(crate) const DOCS_FILE: &str = "docs.bin";

pub(crate) fn segment_dir_name(id: SegmentId) -> String {
    format!("seg_{:06}", id)
}

/// Writer for one shard index.
///
/// Pages accumulate in memory and become durable on [`commit`](Self::commit),
/// which writes them as a new immutable segment and then atomically replaces
/// the shard descriptor. A segment not listed in the descriptor is ignored
/// by readers and removed the next time the shard is opened for writing.
pub struct ShardWriter {
    shard_dir: PathBuf,
    meta: ShardMeta,
    pending: Vec<PageRecord>,
    pending_docs: Vec<DocumentVersion>,
    next_segment: SegmentId,
    reset: bool,
}

impl ShardWriter {
    /// Open the shard at `shard_dir`, creating it if needed.
    ///
    /// An unreadable descriptor discards the shard's contents; check
    /// [`was_reset`](Self::was_reset) to re-index its documents.
    pub fn open(shard_dir: &Path, source: &ShardPlan) -> Result<Self> {
        let meta_path = shard_dir.join(SHARD_META_FILE);
        let mut reset = false;

        let meta = match fs::read_to_string(&meta_path) {
            Ok(content) => match serde_json::from_str::<ShardMeta>(&content) {
                Ok(meta) if meta.version == SHARD_FORMAT_VERSION => meta,
                Ok(meta) => {
                    warn!(path = ?shard_dir, version = meta.version, "Rebuilding shard with unknown format");
                    reset = true;
                    ShardMeta::new(source.clone())
                }
                Err(e) => {
                    warn!(path = ?shard_dir, error = %e, "Rebuilding shard with unreadable descriptor");
                    reset = true;
                    ShardMeta::new(source.clone())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ShardMeta::new(source.clone()),
            Err(e) => return Err(e.into()),
        };

        if reset && shard_dir.exists() {
            fs::remove_dir_all(shard_dir)?;
        }
        fs::create_dir_all(shard_dir)?;

        let writer = Self {
            shard_dir: shard_dir.to_path_buf(),
            next_segment: meta.next_segment_id(),
            meta,
            pending: Vec::new(),
            pending_docs: Vec::new(),
            reset,
        };
        writer.remove_uncommitted_segments()?;
        Ok(writer)
    }

    pub fn was_reset(&self) -> bool {
        self.reset
    }

    pub fn meta(&self) -> &ShardMeta {
        &self.meta
    }

    /// Append a batch of pages; they are not durable until the next commit
    pub fn add_pages(&mut self, pages: Vec<PageRecord>) {
        self.pending.extend(pages);
    }

    pub fn pending_pages(&self) -> usize {
        self.pending.len()
    }

    /// Mark a document version complete. Committed with the next segment,
    /// after every page added before it.
    pub fn add_document(&mut self, version: DocumentVersion) {
        self.pending_docs.push(version);
    }

    /// Write pending pages and document versions as a new segment.
    /// Returns `None` when nothing was pending.
    pub fn commit(&mut self) -> Result<Option<SegmentId>> {
        if self.pending.is_empty() && self.pending_docs.is_empty() {
            return Ok(None);
        }

        let pages = std::mem::take(&mut self.pending);
        let docs = std::mem::take(&mut self.pending_docs);
        let segment_id = match self.write_detached(&pages, &docs) {
            Ok(id) => id,
            Err(e) => {
                self.pending = pages;
                self.pending_docs = docs;
                return Err(e);
            }
        };

        let page_count = pages.len();
        self.meta.segments.push(segment_id);
        self.meta.page_count += page_count as u64;
        self.meta.updated_at = Utc::now();
        write_json_atomic(&self.shard_dir.join(SHARD_META_FILE), &self.meta)?;

        debug!(shard = ?self.shard_dir, segment = segment_id, pages = page_count, "Committed segment");
        Ok(Some(segment_id))
    }

    /// Write a complete segment that the descriptor does not list yet.
    ///
    /// It only becomes visible through [`replace_segments`](Self::replace_segments);
    /// until then it is treated as uncommitted.
    pub fn write_detached(
        &mut self,
        pages: &[PageRecord],
        docs: &[DocumentVersion],
    ) -> Result<SegmentId> {
        let segment_id = self.next_segment;
        self.next_segment += 1;

        let name = segment_dir_name(segment_id);
        let temp_dir = self.shard_dir.join(format!("{}.tmp", name));
        let final_dir = self.shard_dir.join(&name);

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir)?;
        write_segment(&temp_dir, pages, docs)?;
        fs::rename(&temp_dir, &final_dir)?;
        Ok(segment_id)
    }

    /// Atomically make `segments` the whole content of the shard.
    ///
    /// Segments dropped from the descriptor stay on disk until the shard is
    /// next opened for writing, so open readers keep working.
    pub fn replace_segments(&mut self, segments: Vec<SegmentId>, page_count: u64) -> Result<()> {
        self.meta.segments = segments;
        self.meta.page_count = page_count;
        self.meta.updated_at = Utc::now();
        write_json_atomic(&self.shard_dir.join(SHARD_META_FILE), &self.meta)?;
        debug!(shard = ?self.shard_dir, segments = ?self.meta.segments, "Replaced shard segments");
        Ok(())
    }

    /// Drop segment directories the descriptor does not reference
    fn remove_uncommitted_segments(&self) -> Result<()> {
        let committed: Vec<String> = self
            .meta
            .segments
            .iter()
            .map(|&id| segment_dir_name(id))
            .collect();

        for entry in fs::read_dir(&self.shard_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir()
                && name.starts_with("seg_")
                && !committed.contains(&name)
            {
                debug!(segment = %name, "Removing uncommitted segment");
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }
}

/// Write the segment files for `pages` and `docs` into `segment_path`
fn write_segment(segment_path: &Path, pages: &[PageRecord], docs: &[DocumentVersion]) -> Result<()> {
    let analyzer = Analyzer::CaseInsensitive;
    let mut postings: BTreeMap<String, Vec<(PageId, u32)>> = BTreeMap::new();

    let mut pages_file = BufWriter::new(File::create(segment_path.join(PAGES_FILE))?);
    pages_file.write_all(&(pages.len() as u32).to_le_bytes())?;

    for (page_id, page) in pages.iter().enumerate() {
        let page_id = page_id as PageId;

        let mut term_freqs: FxHashMap<String, u32> = FxHashMap::default();
        let tokens = tokenize(&page.text);
        for token in &tokens {
            *term_freqs
                .entry(analyzer.normalize(token.text).into_owned())
                .or_default() += 1;
        }
        for (term, tf) in term_freqs {
            postings.entry(term).or_default().push((page_id, tf));
        }

        write_str(&mut pages_file, &page.path.to_string_lossy())?;
        write_str(&mut pages_file, &page.rel_path.to_string_lossy())?;
        pages_file.write_all(&page.page.to_le_bytes())?;
        pages_file.write_all(&page.mtime.timestamp().to_le_bytes())?;
        pages_file.write_all(&page.mtime.timestamp_subsec_nanos().to_le_bytes())?;
        pages_file.write_all(&(tokens.len() as u32).to_le_bytes())?;
        write_str(&mut pages_file, &page.text)?;
    }
    sync(pages_file)?;

    let mut dict_file = BufWriter::new(File::create(segment_path.join(TERMS_DICT_FILE))?);
    let mut postings_file = BufWriter::new(File::create(segment_path.join(TERMS_POSTINGS_FILE))?);

    dict_file.write_all(&(postings.len() as u32).to_le_bytes())?;
    let mut offset: u64 = 0;

    for (term, list) in &postings {
        let mut encoded = Vec::new();
        encode_postings(list, &mut encoded);

        let term_bytes = term.as_bytes();
        dict_file.write_all(&(term_bytes.len() as u16).to_le_bytes())?;
        dict_file.write_all(term_bytes)?;
        dict_file.write_all(&offset.to_le_bytes())?;
        dict_file.write_all(&(encoded.len() as u32).to_le_bytes())?;
        dict_file.write_all(&(list.len() as u32).to_le_bytes())?;

        postings_file.write_all(&encoded)?;
        offset += encoded.len() as u64;
    }

    sync(dict_file)?;
    sync(postings_file)?;

    let mut docs_file = BufWriter::new(File::create(segment_path.join(DOCS_FILE))?);
    docs_file.write_all(&(docs.len() as u32).to_le_bytes())?;
    for doc in docs {
        write_str(&mut docs_file, &doc.path.to_string_lossy())?;
        docs_file.write_all(&doc.mtime.timestamp().to_le_bytes())?;
        docs_file.write_all(&doc.mtime.timestamp_subsec_nanos().to_le_bytes())?;
    }
    sync(docs_file)?;
    Ok(())
}

fn sync(writer: BufWriter<File>) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}
