//! Append-only log of documents whose indexing fully completed.
//!
//! Each completed document is appended as one JSON line and synced to disk
//! before the builder moves on. The log is replayed into the metadata store at
//! the start of the next run and cleared once that store has been saved.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One completed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    /// Modification time of the version that was indexed
    pub mtime: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CheckpointEntry {
    pub fn new(path: impl Into<PathBuf>, mtime: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            mtime,
            completed_at: Utc::now(),
        }
    }
}

/// Durable record of progress within the current indexing run
#[derive(Debug)]
pub struct ResumeCheckpoint {
    path: PathBuf,
    file: Option<File>,
}

impl ResumeCheckpoint {
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    /// Every entry of the log, oldest first.
    ///
    /// A torn final line (crash mid-append) is ignored.
    pub fn entries(&self) -> Result<Vec<CheckpointEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = ?self.path, error = %e, "Ignoring unreadable checkpoint line"),
            }
        }
        Ok(entries)
    }

    /// Path of the last document that fully completed, if any
    pub fn last_completed(&self) -> Result<Option<PathBuf>> {
        Ok(self.entries()?.pop().map(|e| e.path))
    }

    /// Append one completed document and sync it to disk
    pub fn record(&mut self, entry: &CheckpointEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(&self.path)?;
                self.drop_torn_tail(&mut file)?;
                file
            }
        };
        let file = self.file.insert(file);
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    /// Truncate a final line left incomplete by a crash mid-append, so the
    /// next entry starts on a line of its own
    fn drop_torn_tail(&self, file: &mut File) -> Result<()> {
        let len = file.metadata()?.len();
        let mut buf = [0u8; 4096];
        let mut end = len;

        while end > 0 {
            let start = end.saturating_sub(buf.len() as u64);
            let chunk = &mut buf[..(end - start) as usize];
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(chunk)?;
            if let Some(i) = memchr::memrchr(b'\n', chunk) {
                end = start + i as u64 + 1;
                break;
            }
            end = start;
        }

        if end < len {
            warn!(path = ?self.path, bytes = len - end, "Dropping torn checkpoint line");
            file.set_len(end)?;
        }
        Ok(())
    }

    /// Remove the log once its entries are reflected in saved metadata
    pub fn clear(&mut self) -> Result<()> {
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "Cleared resume checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_empty_checkpoint() {
        let temp = tempdir().unwrap();
        let checkpoint = ResumeCheckpoint::open(&temp.path().join("checkpoint.jsonl"));
        assert!(checkpoint.entries().unwrap().is_empty());
        assert_eq!(checkpoint.last_completed().unwrap(), None);
    }

    #[test]
    fn test_record_is_durable_and_ordered() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("checkpoint.jsonl");
        let mtime = Utc.timestamp_opt(1_700_000_000, 42).unwrap();

        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint.record(&CheckpointEntry::new("/docs/a.txt", mtime)).unwrap();
        checkpoint.record(&CheckpointEntry::new("/docs/b.txt", mtime)).unwrap();

        // A fresh handle sees both entries without any explicit flush
        let reopened = ResumeCheckpoint::open(&path);
        let entries = reopened.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("/docs/a.txt"));
        assert_eq!(entries[0].mtime, mtime);
        assert_eq!(reopened.last_completed().unwrap(), Some(PathBuf::from("/docs/b.txt")));
    }

    #[test]
    fn test_torn_line_ignored() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("checkpoint.jsonl");
        let mtime = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint.record(&CheckpointEntry::new("/docs/a.txt", mtime)).unwrap();
        drop(checkpoint);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"path":"/docs/b.t"#).unwrap();

        let entries = ResumeCheckpoint::open(&path).entries().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_record_after_torn_line() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("checkpoint.jsonl");
        let mtime = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint.record(&CheckpointEntry::new("/docs/a.txt", mtime)).unwrap();
        drop(checkpoint);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"path":"/docs/b.t"#).unwrap();
        drop(file);

        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint.record(&CheckpointEntry::new("/docs/c.txt", mtime)).unwrap();

        let paths: Vec<PathBuf> = checkpoint.entries().unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec![PathBuf::from("/docs/a.txt"), PathBuf::from("/docs/c.txt")]);
    }

    #[test]
    fn test_torn_only_line_truncated() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("checkpoint.jsonl");
        fs::write(&path, br#"{"path":"/do"#).unwrap();

        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint
            .record(&CheckpointEntry::new("/docs/a.txt", Utc::now()))
            .unwrap();
        assert_eq!(checkpoint.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("checkpoint.jsonl");
        let mut checkpoint = ResumeCheckpoint::open(&path);
        checkpoint
            .record(&CheckpointEntry::new("/docs/a.txt", Utc::now()))
            .unwrap();

        checkpoint.clear().unwrap();
        assert!(!path.exists());
        checkpoint.clear().unwrap();

        checkpoint
            .record(&CheckpointEntry::new("/docs/c.txt", Utc::now()))
            .unwrap();
        assert_eq!(checkpoint.entries().unwrap().len(), 1);
    }
}
