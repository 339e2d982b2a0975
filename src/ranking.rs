//! Score fusion for flat retrieval results.
//!
//! Candidates arrive from an embedding or lexical backend with a raw
//! similarity score. Ranking re-scores them under a retrieval mode, drops
//! anything under the minimum score, and keeps the best `max_results`.

use crate::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Memory,
    Sessions,
}

/// A raw hit from a search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub path: String,
    pub snippet: String,
    /// Semantic similarity; usually 0..1 but not guaranteed.
    pub score: f64,
    pub source: SearchSource,
    pub start_line: usize,
    pub end_line: usize,
}

/// How the composite score is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Keyword,
    Hybrid,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Keyword => "keyword",
            RetrievalMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(RetrievalMode::Semantic),
            "keyword" => Ok(RetrievalMode::Keyword),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            other => Err(format!("unknown retrieval mode '{}'", other)),
        }
    }
}

/// One ranking call.
#[derive(Debug, Clone)]
pub struct RankingRequest {
    pub results: Vec<SearchResult>,
    pub query: String,
    pub retrieval_mode: RetrievalMode,
    pub min_score: f64,
    /// Weight of the semantic score in hybrid mode, in `[0, 1]`.
    pub hybrid_alpha: f64,
    pub max_results: usize,
}

impl RankingRequest {
    /// Build a request from configured retrieval defaults.
    pub fn from_config(
        results: Vec<SearchResult>,
        query: impl Into<String>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            results,
            query: query.into(),
            retrieval_mode: config.mode,
            min_score: config.min_score,
            hybrid_alpha: config.hybrid_alpha,
            max_results: config.top_k,
        }
    }
}

/// A surviving candidate with its composite score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    #[serde(rename = "compositeScore")]
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Score normalization
// ---------------------------------------------------------------------------

const QUERY_SEPARATORS: &[char] = &[
    ',', '，', '。', '！', '？', '!', '?', ';', '；', ':', '：',
];

/// Lower-case the query and split it into terms.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || QUERY_SEPARATORS.contains(&c))
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fraction of query terms that occur as substrings of `text`.
///
/// `terms` must already be lower-cased (see [`tokenize_query`]).
pub fn keyword_overlap(text: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

/// Clamp a raw semantic score into `[0, 1]`.
pub fn normalize_semantic(score: f64) -> f64 {
    score.clamp(0.0, 1.0)
}

/// Convex blend of a semantic and a keyword score.
pub fn blend(alpha: f64, semantic: f64, keyword: f64) -> f64 {
    alpha * semantic + (1.0 - alpha) * keyword
}

/// Composite score of one candidate, or `None` if the mode rules it out.
fn composite_score(
    result: &SearchResult,
    terms: &[String],
    mode: RetrievalMode,
    alpha: f64,
) -> Option<f64> {
    match mode {
        RetrievalMode::Semantic => Some(result.score),
        RetrievalMode::Keyword => {
            let overlap = keyword_overlap(&result.snippet, terms);
            (overlap > 0.0).then_some(overlap)
        }
        RetrievalMode::Hybrid => Some(blend(
            alpha,
            normalize_semantic(result.score),
            keyword_overlap(&result.snippet, terms),
        )),
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Rank candidates under the request's retrieval mode.
///
/// Output is a subsequence of the input, ordered by composite score with
/// ties kept in input order, every score `>= min_score`, at most
/// `max_results` long. Never fails.
pub fn rank(request: RankingRequest) -> Vec<RankedResult> {
    let RankingRequest {
        results,
        query,
        retrieval_mode,
        min_score,
        hybrid_alpha,
        max_results,
    } = request;

    let total = results.len();
    let terms = tokenize_query(&query);

    let mut ranked: Vec<RankedResult> = results
        .into_iter()
        .filter_map(|result| {
            let score = composite_score(&result, &terms, retrieval_mode, hybrid_alpha)?;
            (score >= min_score).then_some(RankedResult { result, score })
        })
        .collect();

    // Stable sort keeps input order among equal scores.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(max_results);

    debug!(
        mode = %retrieval_mode,
        candidates = total,
        kept = ranked.len(),
        "Ranked retrieval results"
    );

    ranked
}

/// Rank with the configured mode, threshold, alpha and top-k.
pub fn rank_with_config(
    results: Vec<SearchResult>,
    query: &str,
    config: &RetrievalConfig,
) -> Vec<RankedResult> {
    rank(RankingRequest::from_config(results, query, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, snippet: &str, score: f64) -> SearchResult {
        SearchResult {
            path: path.to_string(),
            snippet: snippet.to_string(),
            score,
            source: SearchSource::Memory,
            start_line: 1,
            end_line: 10,
        }
    }

    fn request(results: Vec<SearchResult>, query: &str, mode: RetrievalMode) -> RankingRequest {
        RankingRequest {
            results,
            query: query.to_string(),
            retrieval_mode: mode,
            min_score: 0.0,
            hybrid_alpha: 0.5,
            max_results: 10,
        }
    }

    fn three_hits() -> Vec<SearchResult> {
        vec![
            hit("a.md", "Rust ownership and borrowing", 0.2),
            hit("b.md", "Gardening tips for spring", 0.9),
            hit("c.md", "Borrowing rules explained", 0.5),
        ]
    }

    #[test]
    fn test_tokenize_query() {
        assert_eq!(tokenize_query("  Rust, Borrow！checker? "), vec!["rust", "borrow", "checker"]);
        assert!(tokenize_query("  ,, ").is_empty());
    }

    #[test]
    fn test_keyword_overlap() {
        let terms = tokenize_query("rust borrow");
        assert_eq!(keyword_overlap("RUST ownership", &terms), 0.5);
        assert_eq!(keyword_overlap("borrowing in rust", &terms), 1.0);
        assert_eq!(keyword_overlap("nothing", &terms), 0.0);
        assert_eq!(keyword_overlap("anything", &[]), 0.0);
    }

    #[test]
    fn test_semantic_filters_and_orders() {
        let mut req = request(three_hits(), "irrelevant", RetrievalMode::Semantic);
        req.min_score = 0.3;
        let ranked = rank(req);
        let scores: Vec<f64> = ranked.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
        assert_eq!(ranked[0].result.path, "b.md");
        assert_eq!(ranked[1].result.path, "c.md");
    }

    #[test]
    fn test_semantic_scores_are_verbatim() {
        let hits = vec![hit("x", "", 1.7), hit("y", "", -0.2)];
        let mut req = request(hits, "", RetrievalMode::Semantic);
        req.min_score = f64::NEG_INFINITY;
        let ranked = rank(req);
        assert_eq!(ranked[0].score, 1.7);
        assert_eq!(ranked[1].score, -0.2);
    }

    #[test]
    fn test_keyword_drops_zero_overlap_even_with_high_score() {
        let ranked = rank(request(three_hits(), "borrowing", RetrievalMode::Keyword));
        let paths: Vec<&str> = ranked.iter().map(|r| r.result.path.as_str()).collect();
        // b.md has the best stored score but no lexical relation.
        assert_eq!(paths, vec!["a.md", "c.md"]);
        assert!(ranked.iter().all(|r| r.score == 1.0));
    }

    #[test]
    fn test_keyword_respects_min_score() {
        // "rust" only in a.md, "explained" only in c.md, "borrowing" in both.
        let mut req = request(three_hits(), "rust borrowing explained", RetrievalMode::Keyword);
        req.min_score = 0.5;
        let ranked = rank(req);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.score >= 0.5));

        let mut req = request(
            three_hits(),
            "rust borrowing explained ownership",
            RetrievalMode::Keyword,
        );
        req.min_score = 0.5;
        let ranked = rank(req);
        // a.md: rust, borrowing, ownership = 0.75; c.md: borrowing, explained = 0.5
        assert_eq!(ranked[0].result.path, "a.md");
        assert_eq!(ranked[0].score, 0.75);
        assert_eq!(ranked[1].result.path, "c.md");
    }

    #[test]
    fn test_keyword_zero_min_score_still_drops_unrelated() {
        let ranked = rank(request(three_hits(), "compiler", RetrievalMode::Keyword));
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_hybrid_blend() {
        let hits = vec![hit("a", "rust borrow", 0.4), hit("b", "nothing", 1.0)];
        let mut req = request(hits, "rust", RetrievalMode::Hybrid);
        req.hybrid_alpha = 0.25;
        let ranked = rank(req);
        // a: 0.25 * 0.4 + 0.75 * 1.0 = 0.85; b: 0.25 * 1.0 + 0 = 0.25
        assert_eq!(ranked[0].result.path, "a");
        assert!((ranked[0].score - 0.85).abs() < 1e-9);
        assert!((ranked[1].score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_clamps_semantic_score() {
        let hits = vec![hit("a", "none", 3.0)];
        let mut req = request(hits, "rust", RetrievalMode::Hybrid);
        req.hybrid_alpha = 1.0;
        assert_eq!(rank(req)[0].score, 1.0);
    }

    #[test]
    fn test_hybrid_alpha_extremes() {
        let query = "rust borrowing";
        let mut semantic = request(three_hits(), query, RetrievalMode::Semantic);
        semantic.min_score = 0.01;
        let mut alpha_one = request(three_hits(), query, RetrievalMode::Hybrid);
        alpha_one.hybrid_alpha = 1.0;
        alpha_one.min_score = 0.01;
        let a: Vec<_> = rank(semantic).into_iter().map(|r| (r.result.path, r.score)).collect();
        let b: Vec<_> = rank(alpha_one).into_iter().map(|r| (r.result.path, r.score)).collect();
        assert_eq!(a, b);

        let mut keyword = request(three_hits(), query, RetrievalMode::Keyword);
        keyword.min_score = 0.01;
        let mut alpha_zero = request(three_hits(), query, RetrievalMode::Hybrid);
        alpha_zero.hybrid_alpha = 0.0;
        alpha_zero.min_score = 0.01;
        let a: Vec<_> = rank(keyword).into_iter().map(|r| (r.result.path, r.score)).collect();
        let b: Vec<_> = rank(alpha_zero).into_iter().map(|r| (r.result.path, r.score)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let hits = vec![hit("first", "", 0.5), hit("second", "", 0.7), hit("third", "", 0.5)];
        let ranked = rank(request(hits, "", RetrievalMode::Semantic));
        let paths: Vec<&str> = ranked.iter().map(|r| r.result.path.as_str()).collect();
        assert_eq!(paths, vec!["second", "first", "third"]);
    }

    #[test]
    fn test_truncates_to_max_results() {
        let hits: Vec<_> = (0..20).map(|i| hit(&i.to_string(), "", i as f64 / 20.0)).collect();
        let mut req = request(hits, "", RetrievalMode::Semantic);
        req.max_results = 3;
        let ranked = rank(req);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].result.path, "19");

        let mut req = request(three_hits(), "", RetrievalMode::Semantic);
        req.max_results = 0;
        assert!(rank(req).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(rank(request(Vec::new(), "rust", RetrievalMode::Hybrid)).is_empty());
    }

    #[test]
    fn test_nan_scores_never_survive() {
        let hits = vec![hit("nan", "", f64::NAN), hit("ok", "", 0.4)];
        let ranked = rank(request(hits, "", RetrievalMode::Semantic));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].result.path, "ok");
    }

    #[test]
    fn test_rank_with_config() {
        let config = RetrievalConfig {
            mode: RetrievalMode::Semantic,
            top_k: 1,
            min_score: 0.0,
            hybrid_alpha: 0.5,
        };
        let ranked = rank_with_config(three_hits(), "q", &config);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].result.path, "b.md");
    }

    #[test]
    fn test_search_result_json_shape() {
        let json = r#"{"path":"m.md","snippet":"s","score":0.3,"source":"sessions","startLine":3,"endLine":9}"#;
        let parsed: SearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.source, SearchSource::Sessions);
        assert_eq!(parsed.start_line, 3);
    }

    #[test]
    fn test_retrieval_mode_parse() {
        assert_eq!("Hybrid".parse::<RetrievalMode>(), Ok(RetrievalMode::Hybrid));
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
        assert_eq!(RetrievalMode::Keyword.to_string(), "keyword");
    }
}
