//! The page-text extraction seam.
//!
//! Real deployments plug in an extractor for their document formats (PDF,
//! office files, ...). [`PlainTextExtractor`] covers UTF-8 text files.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Page number (1-based) -> page text
pub type PageMap = BTreeMap<u32, String>;

/// Produces the pages of one document
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<PageMap>;
}

impl<F> TextExtractor for F
where
    F: Fn(&Path) -> Result<PageMap> + Send + Sync,
{
    fn extract(&self, path: &Path) -> Result<PageMap> {
        self(path)
    }
}

/// Reads UTF-8 text files; form feeds (`\x0c`) separate pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<PageMap> {
        let bytes = fs::read(path).map_err(|e| Error::extraction(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| Error::extraction(path, e))?;

        Ok(text
            .split('\x0c')
            .enumerate()
            .filter(|(_, page)| !page.trim().is_empty())
            .map(|(i, page)| (i as u32 + 1, page.to_string()))
            .collect())
    }
}
