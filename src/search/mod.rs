//! Relevance search over a page index tree.
//!
//! Each candidate section is judged independently by a
//! [`RelevanceEvaluator`], with at most `max_concurrency` judgments in
//! flight. A judgment that fails counts as relevance 0; it never fails the
//! search. Results are ranked like flat search hits: highest score first,
//! capped, zero-relevance sections dropped.

mod relevance;
mod summary;

pub use relevance::{
    LlmRelevanceEvaluator, RelevanceEvaluator, SearchStrategy, parse_relevance, relevance_prompt,
};
pub use summary::{
    CONTEXT_FALLBACK_CHARS, CONTEXT_THRESHOLD_CHARS, MAX_SUMMARY_CHARS, extract_context,
    extract_document_context, generate_node_summary, summarize_tree,
};

use crate::config::SearchConfig;
use crate::tree::{PageIndexTree, PageNode};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Results returned when the caller does not say.
pub const DEFAULT_LIMIT: usize = 5;

const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// One relevant section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageIndexSearchResult {
    pub document_id: String,
    pub filename: String,
    /// Section summary, or a title and page-range label.
    pub content: String,
    /// First page of the section.
    pub page_number: u32,
    /// Section title.
    pub section: String,
    pub score: f64,
}

impl PageIndexSearchResult {
    fn from_node(tree: &PageIndexTree, node: &PageNode, score: f64) -> Self {
        let content = node
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                format!("{} (Page {}-{})", node.title, node.start_page, node.end_page)
            });

        Self {
            document_id: tree.doc_name.clone(),
            filename: tree.doc_name.clone(),
            content,
            page_number: node.start_page,
            section: node.title.clone(),
            score,
        }
    }
}

/// Searches page index trees with a relevance evaluator.
pub struct PageIndexSearcher<E> {
    evaluator: E,
    strategy: SearchStrategy,
    max_concurrency: usize,
}

impl<E: RelevanceEvaluator> PageIndexSearcher<E> {
    /// Leaf scan with the default concurrency cap.
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            strategy: SearchStrategy::LeafScan,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn from_config(evaluator: E, config: &SearchConfig) -> Self {
        Self::new(evaluator)
            .with_strategy(SearchStrategy::from_config(config))
            .with_max_concurrency(config.max_concurrency)
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cap on judgments in flight; 0 is treated as 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Rank the sections of `tree` by relevance to `query`.
    ///
    /// At most `limit` results, in non-increasing score order, all with a
    /// positive score.
    #[instrument(skip_all, fields(doc = %tree.doc_name, limit = limit))]
    pub async fn search_page_index(
        &self,
        tree: &PageIndexTree,
        query: &str,
        limit: usize,
    ) -> Vec<PageIndexSearchResult> {
        let mut scored = match self.strategy {
            SearchStrategy::LeafScan => self.score_nodes(query, tree.leaves()).await,
            SearchStrategy::TopDown { threshold } => {
                self.descend(query, &tree.structure, threshold).await
            }
        };

        let evaluated = scored.len();
        scored.retain(|(_, score)| *score > 0.0);
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);

        info!(evaluated, returned = scored.len(), "Page index search complete");
        scored
            .into_iter()
            .map(|(node, score)| PageIndexSearchResult::from_node(tree, node, score))
            .collect()
    }

    /// Judge `nodes` with bounded concurrency, keeping their input order.
    async fn score_nodes<'t>(
        &self,
        query: &str,
        nodes: Vec<&'t PageNode>,
    ) -> Vec<(&'t PageNode, f64)> {
        let mut scored: Vec<(usize, &'t PageNode, f64)> = stream::iter(
            nodes.into_iter().enumerate(),
        )
            .map(|(index, node)| async move {
                let score = match self.evaluator.evaluate(query, node).await {
                    Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
                    Ok(_) => 0.0,
                    Err(e) => {
                        warn!(
                            node = %node.title,
                            error = %e,
                            "Relevance evaluation failed; scoring 0"
                        );
                        0.0
                    }
                };
                (index, node, score)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        scored.sort_by_key(|(index, _, _)| *index);
        scored.into_iter().map(|(_, node, score)| (node, score)).collect()
    }

    /// Level-by-level walk from the root's children.
    ///
    /// Leaves reached are candidates with their own score. Inner sections
    /// at or above `threshold` are opened; the rest are pruned with their
    /// whole subtree.
    async fn descend<'t>(
        &self,
        query: &str,
        root: &'t PageNode,
        threshold: f64,
    ) -> Vec<(&'t PageNode, f64)> {
        if root.is_leaf() {
            return self.score_nodes(query, vec![root]).await;
        }

        let mut candidates = Vec::new();
        let mut frontier: Vec<&'t PageNode> = root.nodes.iter().collect();
        let mut depth = 1usize;

        while !frontier.is_empty() {
            let scored = self.score_nodes(query, frontier).await;
            let mut next = Vec::new();
            for (node, score) in scored {
                if node.is_leaf() {
                    candidates.push((node, score));
                } else if score >= threshold {
                    next.extend(node.nodes.iter());
                }
            }
            debug!(
                depth,
                candidates = candidates.len(),
                opened = next.len(),
                "Descended one level"
            );
            frontier = next;
            depth += 1;
        }

        candidates
    }
}
