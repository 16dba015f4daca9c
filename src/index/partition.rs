//! Splitting a folder tree into bounded-size shards.
//!
//! A folder whose documents fit under the size ceiling becomes one shard.
//! An oversized folder is split: each subfolder is planned on its own, and
//! the folder's own top-level documents (if any) form a leftover shard.
//! A folder without subfolders cannot be split further and is always a
//! single shard, whatever its size.

use crate::error::{Error, Result};
use crate::index::types::{IndexConfig, ShardPlan};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decides which files are documents
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    globs: Option<GlobSet>,
}

impl DocumentFilter {
    /// Build from glob patterns matched case-insensitively against the file name.
    /// An empty pattern list accepts every file.
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::all());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
        }
        Ok(Self {
            globs: Some(builder.build()?),
        })
    }

    /// Accept every file
    pub fn all() -> Self {
        Self { globs: None }
    }

    pub fn is_document(&self, path: &Path) -> bool {
        match (&self.globs, path.file_name()) {
            (None, _) => true,
            (Some(globs), Some(name)) => globs.is_match(Path::new(name)),
            (Some(_), None) => false,
        }
    }
}

/// Size summary of one folder, built bottom-up
#[derive(Debug)]
struct FolderNode {
    path: PathBuf,
    /// Bytes of documents directly inside the folder
    direct_size: u64,
    /// Number of documents directly inside the folder
    direct_docs: usize,
    /// Bytes of all documents beneath the folder
    total_size: u64,
    /// Number of all documents beneath the folder
    total_docs: usize,
    children: Vec<FolderNode>,
}

/// Plans the shards of a folder tree
#[derive(Debug, Clone)]
pub struct FolderPartitioner {
    size_limit: u64,
    filter: DocumentFilter,
}

impl FolderPartitioner {
    pub fn new(size_limit: u64, filter: DocumentFilter) -> Self {
        Self { size_limit, filter }
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Ok(Self::new(
            config.shard_size_limit,
            DocumentFilter::new(&config.include)?,
        ))
    }

    pub fn filter(&self) -> &DocumentFilter {
        &self.filter
    }

    /// Plan the shards of `root` in pre-order.
    pub fn plan(&self, root: &Path) -> Result<Vec<ShardPlan>> {
        if !root.is_dir() {
            return Err(Error::NotFound(root.to_path_buf()));
        }

        let tree = self.scan(root)?;
        let mut shards = Vec::new();
        self.plan_node(&tree, &mut shards);

        debug!(root = ?root, shards = shards.len(), "Planned shards");
        Ok(shards)
    }

    fn plan_node(&self, node: &FolderNode, out: &mut Vec<ShardPlan>) {
        if node.total_docs == 0 {
            return;
        }

        if node.total_size <= self.size_limit || node.children.is_empty() {
            out.push(ShardPlan::subtree(&node.path));
            return;
        }

        if node.direct_docs > 0 && node.direct_size > 0 {
            out.push(ShardPlan::top_level(&node.path));
        }

        for child in &node.children {
            self.plan_node(child, out);
        }
    }

    /// Walk the tree once, collecting sizes. Unreadable subfolders are skipped.
    fn scan(&self, dir: &Path) -> Result<FolderNode> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut node = FolderNode {
            path: dir.to_path_buf(),
            direct_size: 0,
            direct_docs: 0,
            total_size: 0,
            total_docs: 0,
            children: Vec::new(),
        };

        for entry in entries {
            let path = entry.path();
            // DirEntry::file_type does not follow symlinks
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                match self.scan(&path) {
                    Ok(child) => {
                        node.total_size += child.total_size;
                        node.total_docs += child.total_docs;
                        node.children.push(child);
                    }
                    Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable folder"),
                }
            } else if file_type.is_file() && self.filter.is_document(&path) {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                node.direct_size += size;
                node.direct_docs += 1;
            }
        }

        node.total_size += node.direct_size;
        node.total_docs += node.direct_docs;
        Ok(node)
    }
}
