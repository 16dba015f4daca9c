pub mod build;
pub mod checkpoint;
pub mod compact;
pub mod extract;
pub mod metadata;
pub mod partition;
pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use build::{BuildReport, IndexBuilder, IndexRun, ShardReport, ShardWork};
pub use checkpoint::{CheckpointEntry, ResumeCheckpoint};
pub use compact::{CompactReport, Compactor, compact_root};
pub use extract::{PageMap, PlainTextExtractor, TextExtractor};
pub use metadata::IndexMetadataStore;
pub use partition::{DocumentFilter, FolderPartitioner};
pub use reader::ShardReader;
pub use types::*;
pub use writer::ShardWriter;
