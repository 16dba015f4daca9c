use crate::error::{Error, Result};
use crate::index::checkpoint::ResumeCheckpoint;
use crate::index::metadata::IndexMetadataStore;
use crate::index::types::{ShardMeta, ShardScope};
use crate::index::writer::SHARD_META_FILE;
use crate::utils::{IndexLocator, ShardGroup};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Summary of one shard as recorded in its descriptor
#[derive(Debug, Clone)]
pub struct ShardStats {
    pub dir: PathBuf,
    /// `None` when the descriptor could not be read
    pub meta: Option<ShardMeta>,
}

/// Summary of a shard-group
#[derive(Debug, Clone)]
pub struct GroupStats {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub shards: Vec<ShardStats>,
    pub documents: usize,
    /// Documents completed by an interrupted run, not yet folded into metadata
    pub pending_checkpoint: usize,
    pub index_size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GroupStats {
    pub fn collect(group: &ShardGroup) -> Result<Self> {
        if !group.exists() {
            return Err(Error::NotFound(group.dir.clone()));
        }

        let shards = group
            .shard_dirs()?
            .into_iter()
            .map(|dir| {
                let meta = fs::read_to_string(dir.join(SHARD_META_FILE))
                    .ok()
                    .and_then(|content| serde_json::from_str(&content).ok());
                ShardStats { dir, meta }
            })
            .collect();

        let metadata = IndexMetadataStore::load(&group.metadata_path())?;
        let pending_checkpoint = ResumeCheckpoint::open(&group.checkpoint_path())
            .entries()?
            .len();
        let group_meta = group.read_meta();

        Ok(Self {
            root: group.root.clone(),
            dir: group.dir.clone(),
            shards,
            documents: metadata.len(),
            pending_checkpoint,
            index_size: dir_size(&group.dir)?,
            created_at: group_meta.as_ref().map(|m| m.created_at),
            updated_at: group_meta.as_ref().map(|m| m.updated_at),
        })
    }

    /// Pages across all readable shards, including superseded versions
    pub fn page_count(&self) -> u64 {
        self.shards
            .iter()
            .filter_map(|s| s.meta.as_ref())
            .map(|m| m.page_count)
            .sum()
    }
}

/// Display index statistics
pub fn show_stats(group: &ShardGroup) -> Result<()> {
    let stats = GroupStats::collect(group)?;

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Root path:        {}", stats.root.display());
    println!("Index location:   {}", stats.dir.display());
    println!("Documents:        {}", stats.documents);
    println!("Pages:            {}", stats.page_count());
    println!("Shards:           {}", stats.shards.len());
    if stats.pending_checkpoint > 0 {
        println!(
            "Interrupted run:  {} documents checkpointed (re-run index to resume)",
            stats.pending_checkpoint
        );
    }

    println!();
    for shard in &stats.shards {
        match &shard.meta {
            Some(meta) => {
                let scope = match meta.source.scope {
                    ShardScope::Subtree => "",
                    ShardScope::TopLevel => " (top-level files only)",
                };
                println!("  {}{}", meta.source.root.display(), scope);
                println!(
                    "    {} pages in {} segments, updated {}",
                    meta.page_count,
                    meta.segments.len(),
                    format_timestamp(meta.updated_at)
                );
            }
            None => println!("  {} [unreadable]", shard.dir.display()),
        }
    }

    println!();
    println!("Index size:       {}", format_size(stats.index_size));
    if let Some(created) = stats.created_at {
        println!("Created:          {}", format_timestamp(created));
    }
    if let Some(updated) = stats.updated_at {
        println!("Updated:          {}", format_timestamp(updated));
    }

    Ok(())
}

/// List all indexed roots
pub fn list_indexes(locator: &IndexLocator) -> Result<()> {
    let groups = locator.list_groups()?;

    if groups.is_empty() {
        println!("No indexed folders found.");
        return Ok(());
    }

    println!("Indexed Folders");
    println!("===============");
    println!();

    for info in groups {
        let status = if info.meta.root_path.exists() { "" } else { " [missing]" };
        println!("  {}{}", info.meta.root_path.display(), status);
        println!("    Index: {}", info.group.dir.display());
        println!("    Updated: {}", format_timestamp(info.meta.updated_at));
        println!();
    }

    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
