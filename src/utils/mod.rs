//! Utility functions and data structures.
//!
//! - [`app_data`] - Configuration, index base directory and shard-group location
//! - [`cancel`] - Cooperative cancellation token
//! - [`encoding`] - Varint postings and length-prefixed records
//! - [`progress`] - Progress bar facade (no-op without the `progress` feature)
//! - [`tokenizer`] - Word tokenization and case analysis

pub mod app_data;
pub mod cancel;
pub mod encoding;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use cancel::CancelToken;
pub use encoding::*;
pub use tokenizer::*;
