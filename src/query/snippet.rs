//! Highlighted excerpts of matching pages.

use crate::index::types::SearchConfig;
use crate::utils::tokenize;
use memchr::memmem;
use regex::{Regex, RegexBuilder};

pub const EMPHASIS_START: &str = "<b>";
pub const EMPHASIS_END: &str = "</b>";

/// Finds a literal needle, either byte-exact or case-folded
enum Matcher {
    Exact(memmem::Finder<'static>),
    Folded(Regex),
}

impl Matcher {
    fn new(needle: &str, match_case: bool) -> Option<Self> {
        if needle.is_empty() {
            return None;
        }
        if match_case {
            Some(Matcher::Exact(memmem::Finder::new(needle.as_bytes()).into_owned()))
        } else {
            RegexBuilder::new(&regex::escape(needle))
                .case_insensitive(true)
                .build()
                .ok()
                .map(Matcher::Folded)
        }
    }

    /// Non-overlapping `(start, end)` byte ranges
    fn find_all(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Matcher::Exact(finder) => {
                let len = finder.needle().len();
                finder
                    .find_iter(text.as_bytes())
                    .map(|start| (start, start + len))
                    .collect()
            }
            Matcher::Folded(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        }
    }
}

/// Builds snippets with a fixed amount of context around the first match
#[derive(Debug, Clone, Copy)]
pub struct SnippetBuilder {
    chars_before: usize,
    chars_after: usize,
}

impl SnippetBuilder {
    pub fn new(chars_before: usize, chars_after: usize) -> Self {
        Self {
            chars_before,
            chars_after,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.snippet_chars_before, config.snippet_chars_after)
    }

    /// Excerpt of `text` around the first occurrence of `query`, with every
    /// occurrence inside the excerpt wrapped in `<b>`/`</b>`.
    ///
    /// Falls back to the first occurrence of any single query word, then to
    /// the start of the page without emphasis.
    pub fn build(&self, text: &str, query: &str, match_case: bool) -> String {
        if let Some(matcher) = Matcher::new(query.trim(), match_case) {
            let found = matcher.find_all(text);
            if let Some(&anchor) = found.first() {
                return self.render(text, anchor, &found);
            }
        }

        let mut found = Vec::new();
        let mut words: Vec<&str> = tokenize(query).into_iter().map(|t| t.text).collect();
        words.sort_unstable();
        words.dedup();
        for word in words {
            if let Some(matcher) = Matcher::new(word, match_case) {
                found.extend(matcher.find_all(text));
            }
        }
        found.sort_unstable();
        let found = remove_overlaps(found);
        if let Some(&anchor) = found.first() {
            return self.render(text, anchor, &found);
        }

        text.chars().take(self.chars_before + self.chars_after).collect()
    }

    fn render(&self, text: &str, anchor: (usize, usize), found: &[(usize, usize)]) -> String {
        let start = chars_back(text, anchor.0, self.chars_before);
        let end = chars_forward(text, anchor.1, self.chars_after);

        let mut out = String::with_capacity(end - start + 16);
        let mut pos = start;
        for &(s, e) in found {
            if s < pos || e > end {
                continue;
            }
            out.push_str(&text[pos..s]);
            out.push_str(EMPHASIS_START);
            out.push_str(&text[s..e]);
            out.push_str(EMPHASIS_END);
            pos = e;
        }
        out.push_str(&text[pos..end]);
        out
    }
}

impl Default for SnippetBuilder {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

/// Byte offset `n` characters before `from` (clamped to 0)
fn chars_back(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(from, |(i, _)| i)
}

/// Byte offset `n` characters after `from` (clamped to the end)
fn chars_forward(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}

fn remove_overlaps(sorted: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut result: Vec<(usize, usize)> = Vec::with_capacity(sorted.len());
    for range in sorted {
        if result.last().is_none_or(|last| range.0 >= last.1) {
            result.push(range);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(snippet: &str) -> String {
        snippet.replace(EMPHASIS_START, "").replace(EMPHASIS_END, "")
    }

    #[test]
    fn test_basic_highlight() {
        let snippet = SnippetBuilder::default().build("...the quick brown fox...", "brown", false);
        assert_eq!(snippet, "...the quick <b>brown</b> fox...");
    }

    #[test]
    fn test_context_is_clamped() {
        let text = format!("{} brown {}", "a".repeat(500), "z".repeat(500));
        let snippet = SnippetBuilder::new(50, 100).build(&text, "brown", false);

        assert!(snippet.contains("<b>brown</b>"));
        let plain = strip(&snippet);
        assert_eq!(plain.chars().count(), 50 + "brown".len() + 100);
        assert!(plain.starts_with(&format!("{} ", "a".repeat(49))));
    }

    #[test]
    fn test_case_insensitive_keeps_original_casing() {
        let snippet = SnippetBuilder::default().build("Brown and BROWN", "brown", false);
        assert_eq!(snippet, "<b>Brown</b> and <b>BROWN</b>");
    }

    #[test]
    fn test_case_sensitive_skips_other_casing() {
        let snippet = SnippetBuilder::default().build("Brown and brown", "brown", true);
        assert_eq!(snippet, "Brown and <b>brown</b>");
    }

    #[test]
    fn test_falls_back_to_single_word() {
        let snippet = SnippetBuilder::default().build("a fox jumped over a dog", "lazy dog", false);
        assert_eq!(snippet, "a fox jumped over a <b>dog</b>");
    }

    #[test]
    fn test_no_occurrence_leads_with_page_start() {
        let text = "x".repeat(400);
        let snippet = SnippetBuilder::new(50, 100).build(&text, "missing", false);
        assert_eq!(snippet.len(), 150);
        assert!(!snippet.contains(EMPHASIS_START));
    }

    #[test]
    fn test_multibyte_context() {
        let text = "ééééé brown ééééé";
        let snippet = SnippetBuilder::new(2, 2).build(text, "brown", false);
        assert_eq!(snippet, "é <b>brown</b> é");
    }
}
