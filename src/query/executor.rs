use crate::error::Result;
use crate::index::types::{SearchConfig, SearchResult};
use crate::query::multi::{MultiShardReader, PageAddress};
use crate::query::scorer::Scorer;
use crate::query::snippet::SnippetBuilder;
use crate::query::topk::{Candidate, TopKProcessor};
use crate::utils::{Analyzer, ShardGroup, tokenize};
use regex::{Regex, RegexBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use tracing::debug;

/// Query flags
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Match the query as an exact phrase on word boundaries
    pub whole_word: bool,
    /// Distinguish upper and lower case
    pub match_case: bool,
    /// Keep only results whose absolute path starts with this prefix (case-insensitive)
    pub path_filter: Option<String>,
}

/// How candidates are checked against the stored page text
enum Verifier {
    /// Postings are exact; nothing to check
    None,
    /// At least one query term occurs as analysed by a case-sensitive analyzer
    ExactCase(Analyzer, FxHashSet<String>),
    /// The whole phrase occurs on word boundaries
    Phrase(Regex),
}

impl Verifier {
    fn accepts(&self, text: &str) -> bool {
        match self {
            Verifier::None => true,
            Verifier::ExactCase(analyzer, terms) => analyzer
                .terms(text)
                .iter()
                .any(|t| terms.contains(&**t)),
            Verifier::Phrase(re) => re.is_match(text),
        }
    }
}

/// Executes queries against every shard of a shard-group
pub struct SearchEngine {
    config: SearchConfig,
    snippets: SnippetBuilder,
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        let snippets = SnippetBuilder::from_config(&config);
        Self { config, snippets }
    }

    /// Open the group's shards and run `query` against them.
    pub fn search(
        &self,
        group: &ShardGroup,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let reader = MultiShardReader::open(group)?;
        self.search_reader(&reader, query, options)
    }

    /// Run `query` against already opened shards
    pub fn search_reader(
        &self,
        reader: &MultiShardReader,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let words: Vec<&str> = tokenize(query).into_iter().map(|t| t.text).collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        // Postings are case-folded regardless of the case mode
        let folded = Analyzer::CaseInsensitive;
        let mut terms: Vec<String> = words.iter().map(|w| folded.normalize(w).into_owned()).collect();
        terms.sort_unstable();
        terms.dedup();

        let scorer = Scorer::new(
            self.config.scoring_weights.clone(),
            reader.page_count(),
            reader.avg_page_len(),
        );

        let mut scores: FxHashMap<PageAddress, (f32, usize)> = FxHashMap::default();
        for term in &terms {
            let postings = reader.postings(term);
            let df = postings.len() as u32;
            for (address, tf) in postings {
                let page_len = reader.page(address).map_or(0, |p| p.token_count);
                let entry = scores.entry(address).or_insert((0.0, 0));
                entry.0 += scorer.term_score(tf, df, page_len);
                entry.1 += 1;
            }
        }

        let verifier = self.verifier(&words, options)?;
        let required = if options.whole_word { terms.len() } else { 1 };

        let mut topk = TopKProcessor::new(self.config.max_hits);
        topk.add_candidates(
            scores
                .into_iter()
                .filter(|(_, (_, matched))| *matched >= required)
                .map(|(address, (score, _))| Candidate { address, score }),
        );

        let mut results = Vec::new();
        while let Some(candidate) = topk.next_candidate() {
            let (Some(header), Some(text)) =
                (reader.page(candidate.address), reader.text(candidate.address))
            else {
                topk.reject();
                continue;
            };
            if !verifier.accepts(text) {
                topk.reject();
                continue;
            }
            topk.accept();

            results.push(SearchResult {
                path: header.path.clone(),
                rel_path: header.rel_path.clone(),
                page: header.page,
                snippet: self.snippets.build(text, query, options.match_case),
                score: candidate.score,
            });
        }
        debug!(query, stats = ?topk.stats(), "Query executed");

        if let Some(filter) = options.path_filter.as_deref() {
            results.retain(|r| path_matches(&r.path.to_string_lossy(), filter));
        }

        Ok(dedup_results(results))
    }

    fn verifier(&self, words: &[&str], options: &SearchOptions) -> Result<Verifier> {
        if options.whole_word {
            // Word boundaries are the tokenizer's: anything but a letter or digit
            let body = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join(r"[^\p{L}\p{N}]+");
            let re = RegexBuilder::new(&format!(
                r"(?:^|[^\p{{L}}\p{{N}}]){}(?:$|[^\p{{L}}\p{{N}}])",
                body
            ))
            .case_insensitive(!options.match_case)
            .build()?;
            Ok(Verifier::Phrase(re))
        } else if options.match_case {
            let analyzer = Analyzer::for_case(true);
            let terms = words
                .iter()
                .map(|w| analyzer.normalize(w).into_owned())
                .collect();
            Ok(Verifier::ExactCase(analyzer, terms))
        } else {
            Ok(Verifier::None)
        }
    }
}

/// Case-insensitive prefix match of an absolute path
fn path_matches(path: &str, prefix: &str) -> bool {
    path.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Collapse hits on the same (path, page) keeping the best score, then rank
/// by descending score with ties broken by path and page.
pub fn dedup_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut best: FxHashMap<(std::path::PathBuf, u32), SearchResult> = FxHashMap::default();
    for result in results {
        let key = (result.path.clone(), result.page);
        match best.get(&key) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                best.insert(key, result);
            }
        }
    }

    let mut results: Vec<SearchResult> = best.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.page.cmp(&b.page))
    });
    results
}
