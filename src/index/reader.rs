use crate::error::{Error, Result};
use crate::index::types::*;
use crate::index::writer::{
    DOCS_FILE, PAGES_FILE, SHARD_META_FILE, TERMS_DICT_FILE, TERMS_POSTINGS_FILE,
    segment_dir_name,
};
use crate::utils::{ByteCursor, decode_postings};
use chrono::{DateTime, TimeZone, Utc};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Term dictionary entry
struct TermDictEntry {
    term: String,
    offset: u64,
    length: u32,
    doc_freq: u32,
}

/// Term dictionary, sorted by term (written from a BTreeMap)
struct TermDict {
    entries: Vec<TermDictEntry>,
}

impl TermDict {
    fn lookup(&self, term: &str) -> Option<&TermDictEntry> {
        self.entries
            .binary_search_by(|e| e.term.as_str().cmp(term))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Stored fields of one page; the text stays in the mmapped pages file
#[derive(Debug, Clone)]
pub struct PageHeader {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub page: u32,
    pub mtime: DateTime<Utc>,
    pub token_count: u32,
    text_offset: usize,
    text_len: usize,
}

/// Reader for a single immutable segment
pub struct SegmentReader {
    id: SegmentId,
    pages: Vec<PageHeader>,
    pages_data: Mmap,
    dict: TermDict,
    postings: Option<Mmap>,
    documents: Vec<DocumentVersion>,
}

impl SegmentReader {
    fn open(segment_path: &Path, id: SegmentId) -> Result<Self> {
        let pages_data = map_file(&segment_path.join(PAGES_FILE))?
            .ok_or_else(|| Error::corrupt(segment_path, "empty pages file"))?;
        let pages = read_page_headers(&pages_data)
            .map_err(|e| Error::corrupt(segment_path, e))?;

        let dict_data = fs::read(segment_path.join(TERMS_DICT_FILE))?;
        let dict = read_term_dict(&dict_data).map_err(|e| Error::corrupt(segment_path, e))?;

        let postings = map_file(&segment_path.join(TERMS_POSTINGS_FILE))?;

        let docs_data = fs::read(segment_path.join(DOCS_FILE))?;
        let documents =
            read_documents(&docs_data).map_err(|e| Error::corrupt(segment_path, e))?;

        Ok(Self {
            id,
            pages,
            pages_data,
            dict,
            postings,
            documents,
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn pages(&self) -> &[PageHeader] {
        &self.pages
    }

    /// Document versions this segment completed
    pub fn documents(&self) -> &[DocumentVersion] {
        &self.documents
    }

    pub fn page(&self, page_id: PageId) -> Option<&PageHeader> {
        self.pages.get(page_id as usize)
    }

    /// Stored text of a page
    pub fn text(&self, page_id: PageId) -> Option<&str> {
        let header = self.page(page_id)?;
        let bytes = self
            .pages_data
            .get(header.text_offset..header.text_offset + header.text_len)?;
        std::str::from_utf8(bytes).ok()
    }

    /// `(page_id, term_freq)` pairs for a case-folded term
    pub fn postings(&self, term: &str) -> Vec<(PageId, u32)> {
        let (Some(entry), Some(data)) = (self.dict.lookup(term), &self.postings) else {
            return Vec::new();
        };
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        match data.get(start..end) {
            Some(bytes) => decode_postings(bytes),
            None => Vec::new(),
        }
    }

    /// Number of pages of this segment containing a term
    pub fn doc_freq(&self, term: &str) -> u32 {
        self.dict.lookup(term).map_or(0, |e| e.doc_freq)
    }
}

/// Read-only view of one committed shard index
pub struct ShardReader {
    dir: PathBuf,
    meta: ShardMeta,
    segments: Vec<SegmentReader>,
}

impl ShardReader {
    /// Open every committed segment of the shard at `shard_dir`.
    /// Any inconsistency is reported as [`Error::IndexCorrupt`].
    pub fn open(shard_dir: &Path) -> Result<Self> {
        let meta_path = shard_dir.join(SHARD_META_FILE);
        let content = fs::read_to_string(&meta_path).map_err(|e| Error::corrupt(shard_dir, e))?;
        let meta: ShardMeta =
            serde_json::from_str(&content).map_err(|e| Error::corrupt(shard_dir, e))?;

        if meta.version != SHARD_FORMAT_VERSION {
            return Err(Error::corrupt(
                shard_dir,
                format!("unsupported format version {}", meta.version),
            ));
        }

        let segments = meta
            .segments
            .par_iter()
            .map(|&id| {
                SegmentReader::open(&shard_dir.join(segment_dir_name(id)), id)
                    .map_err(|e| match e {
                        Error::IndexCorrupt { .. } => e,
                        other => Error::corrupt(shard_dir, other),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(shard = ?shard_dir, segments = segments.len(), "Opened shard");
        Ok(Self {
            dir: shard_dir.to_path_buf(),
            meta,
            segments,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &ShardMeta {
        &self.meta
    }

    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    pub fn page_count(&self) -> usize {
        self.segments.iter().map(|s| s.pages.len()).sum()
    }
}

/// Memory-map a file; `None` for an empty file
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: segment files are immutable once their segment is committed
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

fn read_timestamp(cursor: &mut ByteCursor<'_>) -> std::io::Result<DateTime<Utc>> {
    let secs = cursor.read_i64()?;
    let nanos = cursor.read_u32()?;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad timestamp"))
}

fn read_documents(data: &[u8]) -> std::io::Result<Vec<DocumentVersion>> {
    let mut cursor = ByteCursor::new(data);
    let count = cursor.read_u32()? as usize;
    let mut documents = Vec::with_capacity(count.min(data.len() / 16));

    for _ in 0..count {
        let path = PathBuf::from(cursor.read_str()?);
        let mtime = read_timestamp(&mut cursor)?;
        documents.push(DocumentVersion { path, mtime });
    }

    Ok(documents)
}

fn read_page_headers(data: &[u8]) -> std::io::Result<Vec<PageHeader>> {
    let mut cursor = ByteCursor::new(data);
    let count = cursor.read_u32()? as usize;
    // A corrupt count must not drive the allocation
    let mut pages = Vec::with_capacity(count.min(data.len() / 32));

    for _ in 0..count {
        let path = PathBuf::from(cursor.read_str()?);
        let rel_path = PathBuf::from(cursor.read_str()?);
        let page = cursor.read_u32()?;
        let mtime = read_timestamp(&mut cursor)?;
        let token_count = cursor.read_u32()?;
        let (text_offset, text_len) = cursor.skip_str()?;

        pages.push(PageHeader {
            path,
            rel_path,
            page,
            mtime,
            token_count,
            text_offset,
            text_len,
        });
    }

    Ok(pages)
}

fn read_term_dict(data: &[u8]) -> std::io::Result<TermDict> {
    let mut cursor = ByteCursor::new(data);
    let count = cursor.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count.min(data.len() / 18));

    for _ in 0..count {
        let len = cursor.read_u16()? as usize;
        let term = String::from_utf8_lossy(cursor.read_bytes(len)?).into_owned();
        let offset = cursor.read_u64()?;
        let length = cursor.read_u32()?;
        let doc_freq = cursor.read_u32()?;

        entries.push(TermDictEntry {
            term,
            offset,
            length,
            doc_freq,
        });
    }

    Ok(TermDict { entries })
}
