#![allow(dead_code)]

use docshard::utils::{IndexLocator, ShardGroup};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

/// A document tree and an index base directory in one scratch directory
pub struct Fixture {
    _temp: TempDir,
    pub root: PathBuf,
    pub locator: IndexLocator,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("documents");
        fs::create_dir_all(&root).expect("Failed to create document root");
        let locator = IndexLocator::new(temp.path().join("indexes"));
        Self {
            _temp: temp,
            root,
            locator,
        }
    }

    pub fn group(&self) -> ShardGroup {
        self.locator.locate(&self.root)
    }

    /// Write a document with a fixed modification time (seconds since epoch)
    pub fn write(&self, rel: &str, text: &str, mtime_secs: u64) -> PathBuf {
        let path = self.root.join(rel);
        write_with_mtime(&path, text, mtime_secs);
        path
    }
}

pub fn write_with_mtime(path: &Path, text: &str, mtime_secs: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, text).expect("Failed to write document");
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs)))
        .expect("Failed to set mtime");
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
