//! Persisted map of document path to last-indexed modification time.
//!
//! Updated in memory once per successfully indexed document and written to
//! disk once at the end of an indexing run. Documents completed since the
//! last write are covered by the resume checkpoint.

use crate::error::Result;
use crate::utils::write_json_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const METADATA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    version: u32,
    documents: BTreeMap<PathBuf, DateTime<Utc>>,
}

/// Document path -> modification time it was last indexed at
#[derive(Debug)]
pub struct IndexMetadataStore {
    path: PathBuf,
    documents: BTreeMap<PathBuf, DateTime<Utc>>,
}

impl IndexMetadataStore {
    /// Load the store at `path`; a missing file yields an empty store.
    ///
    /// An unreadable file is logged and treated as empty, so every document
    /// is indexed again rather than the run failing.
    pub fn load(path: &Path) -> Result<Self> {
        let documents = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<MetadataFile>(&content) {
                Ok(file) => file.documents,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Discarding unreadable index metadata");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = ?path, documents = documents.len(), "Loaded index metadata");
        Ok(Self {
            path: path.to_path_buf(),
            documents,
        })
    }

    /// Whether a document with this modification time must be (re)indexed
    pub fn needs_indexing(&self, path: &Path, mtime: DateTime<Utc>) -> bool {
        match self.documents.get(path) {
            Some(recorded) => mtime > *recorded,
            None => true,
        }
    }

    pub fn get(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.documents.get(path).copied()
    }

    /// Record a successfully indexed document. Never moves a timestamp backwards.
    pub fn record(&mut self, path: &Path, mtime: DateTime<Utc>) {
        self.documents
            .entry(path.to_path_buf())
            .and_modify(|t| {
                if mtime > *t {
                    *t = mtime;
                }
            })
            .or_insert(mtime);
    }

    /// Forget every document `keep` rejects; returns how many were dropped
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) -> usize {
        let before = self.documents.len();
        self.documents.retain(|path, _| keep(path));
        before - self.documents.len()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Write the whole store atomically
    pub fn save(&self) -> Result<()> {
        let file = MetadataFile {
            version: METADATA_VERSION,
            documents: self.documents.clone(),
        };
        write_json_atomic(&self.path, &file)?;
        debug!(path = ?self.path, documents = self.documents.len(), "Saved index metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let store = IndexMetadataStore::load(&temp.path().join("metadata.json")).unwrap();
        assert!(store.is_empty());
        assert!(store.needs_indexing(Path::new("/docs/a.txt"), ts(0, 0)));
    }

    #[test]
    fn test_needs_indexing_only_when_newer() {
        let temp = tempdir().unwrap();
        let mut store = IndexMetadataStore::load(&temp.path().join("metadata.json")).unwrap();
        let doc = Path::new("/docs/a.txt");

        store.record(doc, ts(1_700_000_000, 5));
        assert!(!store.needs_indexing(doc, ts(1_700_000_000, 5)));
        assert!(!store.needs_indexing(doc, ts(1_600_000_000, 0)));
        assert!(store.needs_indexing(doc, ts(1_700_000_000, 6)));
    }

    #[test]
    fn test_record_never_goes_backwards() {
        let temp = tempdir().unwrap();
        let mut store = IndexMetadataStore::load(&temp.path().join("metadata.json")).unwrap();
        let doc = Path::new("/docs/a.txt");

        store.record(doc, ts(200, 0));
        store.record(doc, ts(100, 0));
        assert_eq!(store.get(doc), Some(ts(200, 0)));
    }

    #[test]
    fn test_round_trip_preserves_precision() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metadata.json");

        let mut store = IndexMetadataStore::load(&path).unwrap();
        store.record(Path::new("/docs/a.txt"), ts(1_700_000_000, 123_456_789));
        store.record(Path::new("/docs/sub/b.txt"), ts(1_700_000_100, 0));
        store.save().unwrap();

        let reloaded = IndexMetadataStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get(Path::new("/docs/a.txt")),
            Some(ts(1_700_000_000, 123_456_789))
        );

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("2023-11-14T22:13:20.123456789Z"));
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metadata.json");
        fs::write(&path, "{not json").unwrap();

        let store = IndexMetadataStore::load(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_retain_drops_rejected() {
        let temp = tempdir().unwrap();
        let mut store = IndexMetadataStore::load(&temp.path().join("metadata.json")).unwrap();
        store.record(Path::new("/docs/a.txt"), ts(10, 0));
        store.record(Path::new("/docs/b.txt"), ts(10, 0));

        let dropped = store.retain(|path| path.ends_with("a.txt"));
        assert_eq!(dropped, 1);
        assert!(store.get(Path::new("/docs/b.txt")).is_none());
        assert_eq!(store.len(), 1);
    }
}
