//! Relevance judgments for single sections.

use crate::config::{SearchConfig, StrategyKind};
use crate::error::Result;
use crate::llm::json::{extract_json, lenient_f64};
use crate::llm::{CallOptions, Extracted, ModelCall, Prompts};
use crate::tree::PageNode;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const RELEVANCE_TEMPERATURE: f32 = 0.3;

/// Scores how relevant one section is to a query, in `[0, 1]`.
///
/// An `Err` means the judgment could not be made at all; searchers count it
/// as relevance 0.
#[async_trait]
pub trait RelevanceEvaluator: Send + Sync {
    async fn evaluate(&self, query: &str, node: &PageNode) -> Result<f64>;
}

#[async_trait]
impl<T: RelevanceEvaluator + ?Sized> RelevanceEvaluator for Arc<T> {
    async fn evaluate(&self, query: &str, node: &PageNode) -> Result<f64> {
        (**self).evaluate(query, node).await
    }
}

/// How the tree is walked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SearchStrategy {
    /// Evaluate every leaf independently.
    #[default]
    LeafScan,
    /// Evaluate level by level, descending only into sections scoring at
    /// least `threshold`.
    TopDown { threshold: f64 },
}

impl SearchStrategy {
    pub fn from_config(config: &SearchConfig) -> Self {
        match config.strategy {
            StrategyKind::LeafScan => SearchStrategy::LeafScan,
            StrategyKind::TopDown => SearchStrategy::TopDown {
                threshold: config.relevance_threshold,
            },
        }
    }
}

/// Fill the relevance prompt for one section.
pub fn relevance_prompt(query: &str, node: &PageNode) -> String {
    let summary = node
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("Section summary: {s}\n"))
        .unwrap_or_default();

    Prompts::fill(
        Prompts::node_relevance(),
        &[("query", query), ("title", &node.title), ("summary", &summary)],
    )
}

/// Read a relevance score from a model response.
///
/// Accepts `{"relevance": x, ...}` or a bare number.
pub fn parse_relevance(response: &str) -> Extracted<f64> {
    let score = match extract_json(response) {
        Some(Value::Object(obj)) => obj.get("relevance").and_then(lenient_f64),
        Some(value) => lenient_f64(&value),
        None => response.trim().parse().ok(),
    };

    match score {
        Some(s) if s.is_finite() => Extracted::Parsed(s.clamp(0.0, 1.0)),
        Some(_) => Extracted::skipped("relevance is not a finite number"),
        None => Extracted::skipped("no relevance in response"),
    }
}

/// Asks a model for each judgment.
pub struct LlmRelevanceEvaluator<M> {
    model: M,
}

impl<M: ModelCall> LlmRelevanceEvaluator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: ModelCall> RelevanceEvaluator for LlmRelevanceEvaluator<M> {
    async fn evaluate(&self, query: &str, node: &PageNode) -> Result<f64> {
        let prompt = relevance_prompt(query, node);
        let options = CallOptions::default().temperature(RELEVANCE_TEMPERATURE);
        let response = self
            .model
            .call(Prompts::system_document_analyzer(), &prompt, options)
            .await?;

        match parse_relevance(&response) {
            Extracted::Parsed(score) => Ok(score),
            Extracted::Skipped(reason) => {
                debug!(node = %node.title, %reason, "Unreadable relevance; scoring 0");
                Ok(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KnowledgeError;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn test_parse_relevance() {
        assert_eq!(parse_relevance(r#"{"relevance": 0.8, "reason": "x"}"#), Extracted::Parsed(0.8));
        assert_eq!(
            parse_relevance("```json\n{\"relevance\": \"0.4\"}\n```"),
            Extracted::Parsed(0.4)
        );
        assert_eq!(parse_relevance(r#"{"relevance": 1.7}"#), Extracted::Parsed(1.0));
        assert_eq!(parse_relevance(r#"{"relevance": -2}"#), Extracted::Parsed(0.0));
        assert_eq!(parse_relevance("0.25"), Extracted::Parsed(0.25));
        assert!(!parse_relevance(r#"{"reason": "none"}"#).is_parsed());
        assert!(!parse_relevance("I think it's relevant").is_parsed());
        assert!(!parse_relevance(r#"{"relevance": "NaN"}"#).is_parsed());
    }

    #[test]
    fn test_relevance_prompt() {
        let node = PageNode::new("Billing", "01BIL001", 3, 4).with_summary("Invoices and refunds");
        let prompt = relevance_prompt("how do refunds work", &node);
        assert!(prompt.contains("User question: how do refunds work"));
        assert!(prompt.contains("Section title: Billing"));
        assert!(prompt.contains("Section summary: Invoices and refunds"));

        let bare = relevance_prompt("q", &PageNode::new("Billing", "01BIL001", 3, 4));
        assert!(!bare.contains("Section summary"));
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = SearchConfig::default();
        assert_eq!(SearchStrategy::from_config(&config), SearchStrategy::LeafScan);
        config.strategy = StrategyKind::TopDown;
        config.relevance_threshold = 0.6;
        assert_eq!(
            SearchStrategy::from_config(&config),
            SearchStrategy::TopDown { threshold: 0.6 }
        );
    }

    #[tokio::test]
    async fn test_llm_evaluator() {
        let model = ScriptedModel::fixed(r#"{"relevance": 1.4, "reason": "exact match"}"#);
        let evaluator = LlmRelevanceEvaluator::new(model);
        let node = PageNode::new("Intro", "01INT001", 1, 2);

        assert_eq!(evaluator.evaluate("intro", &node).await.unwrap(), 1.0);
        let calls = evaluator.model.calls.lock().unwrap();
        assert_eq!(calls[0].2.temperature, Some(RELEVANCE_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_llm_evaluator_garbage_scores_zero() {
        let evaluator = LlmRelevanceEvaluator::new(ScriptedModel::fixed("no idea"));
        let node = PageNode::new("Intro", "01INT001", 1, 2);
        assert_eq!(evaluator.evaluate("q", &node).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_llm_evaluator_propagates_call_failure() {
        let evaluator = LlmRelevanceEvaluator::new(ScriptedModel::failing());
        let node = PageNode::new("Intro", "01INT001", 1, 2);
        let err = evaluator.evaluate("q", &node).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::LlmApi(_)));
    }
}
