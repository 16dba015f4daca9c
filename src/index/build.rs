//! Incremental, resumable indexing of a shard-group.
//!
//! A run plans the shards of the root, then builds them one after another.
//! Within a shard, changed documents are processed smallest first: small
//! documents by a bounded pool of extractor threads feeding a single writer,
//! large documents sequentially with frequent commits. Completed documents
//! are appended to the resume checkpoint only once their pages are committed.

use crate::error::{Error, Result};
use crate::index::checkpoint::{CheckpointEntry, ResumeCheckpoint};
use crate::index::compact::Compactor;
use crate::index::extract::TextExtractor;
use crate::index::metadata::IndexMetadataStore;
use crate::index::partition::{DocumentFilter, FolderPartitioner};
use crate::index::types::{
    DocumentEntry, DocumentVersion, IndexConfig, PageRecord, ShardPlan, ShardScope,
};
use crate::index::writer::ShardWriter;
use crate::utils::{CancelToken, ShardGroup};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use tracing::{debug, info, warn};

/// Progress callback: `(processed, total)` documents of the run
pub type ProgressFn<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

/// Outcome of one shard build
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShardReport {
    /// Documents found in the shard
    pub documents: usize,
    /// Documents that needed (re)indexing
    pub changed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub pages: usize,
}

/// Outcome of a full indexing run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub shards: usize,
    pub documents: usize,
    pub changed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub pages: usize,
    /// Documents recovered from an interrupted run's checkpoint
    pub resumed: usize,
    /// Previously indexed documents no longer found on disk
    pub removed: usize,
    /// Pages dropped by compacting shards after the run
    pub reclaimed_pages: usize,
}

impl BuildReport {
    fn absorb(&mut self, shard: &ShardReport) {
        self.shards += 1;
        self.documents += shard.documents;
        self.changed += shard.changed;
        self.indexed += shard.indexed;
        self.failed += shard.failed;
        self.pages += shard.pages;
    }
}

/// State shared by every shard of one indexing run
pub struct IndexRun {
    group: ShardGroup,
    metadata: IndexMetadataStore,
    checkpoint: ResumeCheckpoint,
    processed: usize,
    total: usize,
    report: BuildReport,
}

impl IndexRun {
    /// Start a run: load metadata and fold in the checkpoint of an interrupted run.
    pub fn begin(group: &ShardGroup) -> Result<Self> {
        group.ensure()?;

        let mut metadata = IndexMetadataStore::load(&group.metadata_path())?;
        let checkpoint = ResumeCheckpoint::open(&group.checkpoint_path());

        let entries = checkpoint.entries()?;
        if let Some(last) = entries.last() {
            info!(
                completed = entries.len(),
                last = ?last.path,
                "Resuming interrupted indexing run"
            );
        }
        for entry in &entries {
            metadata.record(&entry.path, entry.mtime);
        }

        Ok(Self {
            group: group.clone(),
            metadata,
            checkpoint,
            processed: 0,
            total: 0,
            report: BuildReport {
                resumed: entries.len(),
                ..Default::default()
            },
        })
    }

    pub fn group(&self) -> &ShardGroup {
        &self.group
    }

    pub fn metadata(&self) -> &IndexMetadataStore {
        &self.metadata
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Record a document whose pages are committed
    fn complete(&mut self, doc: &DocumentEntry) -> Result<()> {
        self.checkpoint
            .record(&CheckpointEntry::new(&doc.path, doc.mtime))?;
        self.metadata.record(&doc.path, doc.mtime);
        Ok(())
    }

    /// Persist metadata and drop the checkpoint it now covers
    pub fn finish(&mut self) -> Result<()> {
        self.metadata.save()?;
        self.checkpoint.clear()?;
        self.group.ensure()
    }
}

/// The documents of one planned shard, smallest first
#[derive(Debug, Clone)]
pub struct ShardWork {
    pub plan: ShardPlan,
    pub documents: Vec<DocumentEntry>,
}

impl ShardWork {
    /// Documents new or modified since they were last indexed
    pub fn changed(&self, metadata: &IndexMetadataStore) -> Vec<DocumentEntry> {
        self.documents
            .iter()
            .filter(|d| metadata.needs_indexing(&d.path, d.mtime))
            .cloned()
            .collect()
    }
}

enum WriterMessage {
    Pages(Vec<PageRecord>),
    Completed(DocumentEntry, usize),
    Failed(PathBuf, Error),
}

/// Builds shard indexes from documents using a [`TextExtractor`]
pub struct IndexBuilder<'a> {
    config: IndexConfig,
    extractor: &'a dyn TextExtractor,
    progress: Option<&'a ProgressFn<'a>>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: IndexConfig, extractor: &'a dyn TextExtractor) -> Self {
        Self {
            config,
            extractor,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Index (or bring up to date) every shard of the group's root.
    pub fn index_root(&self, group: &ShardGroup, cancel: &CancelToken) -> Result<BuildReport> {
        let partitioner = FolderPartitioner::from_config(&self.config)?;
        let plans = partitioner.plan(&group.root)?;
        info!(root = ?group.root, shards = plans.len(), "Indexing");

        let mut run = IndexRun::begin(group)?;

        let work: Vec<ShardWork> = plans
            .into_iter()
            .map(|plan| self.plan_shard(&group.root, plan, partitioner.filter()))
            .collect();
        let present: FxHashSet<&Path> = work
            .iter()
            .flat_map(|w| w.documents.iter().map(|d| d.path.as_path()))
            .collect();
        run.report.removed = run.metadata.retain(|path| present.contains(path));
        if run.report.removed > 0 {
            info!(removed = run.report.removed, "Documents removed since the last run");
        }

        run.total = work.iter().map(|w| w.changed(&run.metadata).len()).sum();
        self.report_progress(&run);

        for shard in work {
            let report = self.build_shard(&mut run, shard, cancel)?;
            run.report.absorb(&report);
        }

        run.finish()?;
        let compaction = Compactor::new(&run.metadata, &self.config).compact_group(group)?;
        run.report.reclaimed_pages = compaction.pages_removed;

        let report = run.report;
        info!(
            indexed = report.indexed,
            failed = report.failed,
            pages = report.pages,
            reclaimed = report.reclaimed_pages,
            "Indexing complete"
        );
        Ok(report)
    }

    /// Enumerate a shard's documents, sorted ascending by size
    pub fn plan_shard(&self, group_root: &Path, plan: ShardPlan, filter: &DocumentFilter) -> ShardWork {
        let mut documents = enumerate_documents(&plan, group_root, filter);
        documents.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
        ShardWork { plan, documents }
    }

    /// Bring one shard's index up to date.
    ///
    /// Returns [`Error::Cancelled`] after committing and checkpointing every
    /// fully completed document when `cancel` fires.
    pub fn build_shard(
        &self,
        run: &mut IndexRun,
        work: ShardWork,
        cancel: &CancelToken,
    ) -> Result<ShardReport> {
        let shard_dir = run.group.shard_dir(&work.plan);
        let mut writer = ShardWriter::open(&shard_dir, &work.plan)?;

        let changed = if writer.was_reset() {
            let stale = work.changed(&run.metadata).len();
            run.total += work.documents.len() - stale;
            work.documents.clone()
        } else {
            work.changed(&run.metadata)
        };

        let mut report = ShardReport {
            documents: work.documents.len(),
            changed: changed.len(),
            ..Default::default()
        };

        if changed.is_empty() {
            debug!(shard = ?work.plan.root, "Shard up to date");
            return Ok(report);
        }

        info!(
            shard = ?work.plan.root,
            documents = report.documents,
            changed = report.changed,
            "Building shard"
        );

        let (small, large): (Vec<_>, Vec<_>) = changed
            .into_iter()
            .partition(|d| d.size < self.config.large_document_threshold);

        self.index_small(run, &mut writer, &small, cancel, &mut report)?;
        self.index_large(run, &mut writer, &large, cancel, &mut report)?;

        Ok(report)
    }

    /// Small documents: worker pool produces page batches, this thread writes them
    fn index_small(
        &self,
        run: &mut IndexRun,
        writer: &mut ShardWriter,
        docs: &[DocumentEntry],
        cancel: &CancelToken,
        report: &mut ShardReport,
    ) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let workers = self.config.small_document_workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("docshard-extract-{i}"))
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        let (tx, rx) = mpsc::sync_channel::<WriterMessage>(workers * 4);
        let next = AtomicUsize::new(0);
        let abort = CancelToken::new();
        let mut staged: Vec<DocumentEntry> = Vec::new();
        let mut outcome: Result<()> = Ok(());

        thread::scope(|s| {
            let next = &next;
            let abort = &abort;
            let pool = &pool;
            s.spawn(move || {
                pool.scope(|ps| {
                    for _ in 0..workers {
                        let tx = tx.clone();
                        ps.spawn(move |_| self.produce(docs, next, &tx, cancel, abort));
                    }
                });
                drop(tx);
            });

            for message in rx {
                if outcome.is_err() {
                    continue;
                }
                match message {
                    WriterMessage::Pages(batch) => {
                        writer.add_pages(batch);
                        if writer.pending_pages() >= self.config.commit_interval_pages {
                            if let Err(e) = commit_and_checkpoint(run, writer, &mut staged) {
                                outcome = Err(e);
                                abort.cancel();
                            }
                        }
                    }
                    WriterMessage::Completed(doc, pages) => {
                        writer.add_document(DocumentVersion::from(&doc));
                        report.indexed += 1;
                        report.pages += pages;
                        staged.push(doc);
                        run.processed += 1;
                        self.report_progress(run);
                    }
                    WriterMessage::Failed(path, e) => {
                        warn!(path = ?path, error = %e, "Skipping document");
                        report.failed += 1;
                        run.processed += 1;
                        self.report_progress(run);
                    }
                }
            }
        });

        outcome?;
        commit_and_checkpoint(run, writer, &mut staged)?;
        cancel.check()
    }

    /// Pull documents in order and stream their batches to the writer thread
    fn produce(
        &self,
        docs: &[DocumentEntry],
        next: &AtomicUsize,
        tx: &SyncSender<WriterMessage>,
        cancel: &CancelToken,
        abort: &CancelToken,
    ) {
        loop {
            if cancel.is_cancelled() || abort.is_cancelled() {
                return;
            }
            let i = next.fetch_add(1, Ordering::SeqCst);
            let Some(doc) = docs.get(i) else {
                return;
            };

            let result = self.ingest_document(doc, cancel, |batch| {
                tx.send(WriterMessage::Pages(batch))
                    .map_err(|_| Error::Cancelled)
            });

            let message = match result {
                Ok(pages) => WriterMessage::Completed(doc.clone(), pages),
                Err(Error::Cancelled) => return,
                Err(e) => WriterMessage::Failed(doc.path.clone(), e),
            };
            if tx.send(message).is_err() {
                return;
            }
        }
    }

    /// Large documents: one at a time on this thread, committed as they go
    fn index_large(
        &self,
        run: &mut IndexRun,
        writer: &mut ShardWriter,
        docs: &[DocumentEntry],
        cancel: &CancelToken,
        report: &mut ShardReport,
    ) -> Result<()> {
        let interval = self.config.commit_interval_pages.max(1);

        for doc in docs {
            if cancel.is_cancelled() {
                writer.commit()?;
                return Err(Error::Cancelled);
            }

            debug!(path = ?doc.path, size = doc.size, "Indexing large document");
            let result = self.ingest_document(doc, cancel, |batch| {
                writer.add_pages(batch);
                if writer.pending_pages() >= interval {
                    writer.commit()?;
                }
                Ok(())
            });

            match result {
                Ok(pages) => {
                    writer.add_document(DocumentVersion::from(doc));
                    writer.commit()?;
                    run.complete(doc)?;
                    report.indexed += 1;
                    report.pages += pages;
                }
                Err(Error::Cancelled) => {
                    writer.commit()?;
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    warn!(path = ?doc.path, error = %e, "Skipping document");
                    report.failed += 1;
                }
            }

            run.processed += 1;
            self.report_progress(run);
        }

        Ok(())
    }

    /// Extract one document and hand its pages to `sink` in batches.
    /// Cancellation is checked before every batch.
    fn ingest_document(
        &self,
        doc: &DocumentEntry,
        cancel: &CancelToken,
        mut sink: impl FnMut(Vec<PageRecord>) -> Result<()>,
    ) -> Result<usize> {
        let pages = self.extractor.extract(&doc.path).map_err(|e| match e {
            Error::ExtractionFailed { .. } => e,
            other => Error::extraction(&doc.path, other),
        })?;

        let batch_size = self.config.page_batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(pages.len()));
        let mut count = 0;

        for (page, text) in pages {
            batch.push(PageRecord {
                path: doc.path.clone(),
                rel_path: doc.rel_path.clone(),
                page,
                mtime: doc.mtime,
                text,
            });
            count += 1;

            if batch.len() == batch_size {
                cancel.check()?;
                sink(std::mem::take(&mut batch))?;
            }
        }

        if !batch.is_empty() {
            cancel.check()?;
            sink(batch)?;
        }

        Ok(count)
    }

    fn report_progress(&self, run: &IndexRun) {
        if let Some(progress) = self.progress {
            progress(run.processed, run.total);
        }
    }
}

/// Commit pending pages, then checkpoint every document they completed
fn commit_and_checkpoint(
    run: &mut IndexRun,
    writer: &mut ShardWriter,
    staged: &mut Vec<DocumentEntry>,
) -> Result<()> {
    writer.commit()?;
    for doc in staged.drain(..) {
        run.complete(&doc)?;
    }
    Ok(())
}

/// Walk the documents belonging to a shard
fn enumerate_documents(
    plan: &ShardPlan,
    group_root: &Path,
    filter: &DocumentFilter,
) -> Vec<DocumentEntry> {
    let max_depth = match plan.scope {
        ShardScope::Subtree => None,
        ShardScope::TopLevel => Some(1),
    };

    let walker = WalkBuilder::new(&plan.root)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(max_depth)
        .build();

    let mut documents = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) || !filter.is_document(entry.path()) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "Skipping unreadable document");
                continue;
            }
        };
        let mtime: DateTime<Utc> = match metadata.modified() {
            Ok(t) => t.into(),
            Err(_) => DateTime::<Utc>::UNIX_EPOCH,
        };

        let path = entry.into_path();
        let rel_path = path
            .strip_prefix(group_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());

        documents.push(DocumentEntry {
            path,
            rel_path,
            size: metadata.len(),
            mtime,
        });
    }

    documents
}
