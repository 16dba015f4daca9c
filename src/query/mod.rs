pub mod executor;
pub mod multi;
pub mod scorer;
pub mod snippet;
pub mod topk;

pub use executor::{SearchEngine, SearchOptions, dedup_results};
pub use multi::{MultiShardReader, PageAddress};
pub use scorer::{Scorer, ScoringWeights};
pub use snippet::SnippetBuilder;
pub use topk::{Candidate, TopKProcessor, TopKStats};
