pub mod cache_key;
pub mod errors;
pub mod fields;
pub mod filter;
pub mod heuristics;
pub mod index;
pub mod normalize;
pub mod sort;
pub mod wire;

pub use cache_key::{canonicalize, CacheKey};
pub use errors::FilterError;
pub use fields::*;
pub use filter::*;
pub use heuristics::{HeuristicEngine, HeuristicRule, KeywordRule, QueryText};
pub use index::*;
pub use normalize::{has_categorical_clause, normalize, normalize_observed};
pub use sort::sort_rows;
pub use wire::*;

/// A document as returned by the backing store
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Milliseconds since the unix epoch, used for `_creationTime` defaults
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
