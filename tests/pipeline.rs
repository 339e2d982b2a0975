//! End-to-end runs of the public API against a canned model.

use async_trait::async_trait;
use knowledge_engine::config::{Config, KnowledgeGraphSettings};
use knowledge_engine::graph::{AgentScope, ExtractionRequest, TripleExtractor};
use knowledge_engine::llm::{CallOptions, ModelCall};
use knowledge_engine::ranking::{SearchSource, rank_with_config};
use knowledge_engine::search::LlmRelevanceEvaluator;
use knowledge_engine::{
    Document, KnowledgeError, PageIndexSearcher, Result, SearchResult, SearchStrategy, TreeIndexer,
    load_tree, save_tree,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers by recognising which prompt it was sent.
struct CannedModel;

#[async_trait]
impl ModelCall for CannedModel {
    async fn call(&self, prompt: &str, context: &str, _options: CallOptions) -> Result<String> {
        if prompt.contains("leader dots") {
            return Ok(concat!(
                "```json\n",
                "[{\"title\": \"Getting Started\", \"level\": 1, \"page\": 2},\n",
                " {\"title\": \"Installation\", \"level\": 2, \"page\": 2},\n",
                " {\"title\": \"Configuration\", \"level\": 2, \"page\": \"3\"},\n",
                " {\"title\": \"Billing\", \"level\": 1, \"page\": 4},\n",
                " {\"level\": 1, \"page\": 5}]\n",
                "```"
            )
            .to_string());
        }
        if context.contains("Section title: Installation") {
            return Ok(r#"{"relevance": 0.95, "reason": "covers installing"}"#.to_string());
        }
        if context.contains("Section title: Configuration") {
            return Ok("Relevance: {\"relevance\": 0.6}".to_string());
        }
        if context.contains("Section title: Billing") {
            return Err(KnowledgeError::LlmApi("rate limited".to_string()));
        }
        if context.contains("JSONL") {
            return Ok(concat!(
                "{\"h\": {\"name\": \"Engine\"}, \"r\": {\"type\": \"runs_on\"}, \"t\": {\"name\": \"Linux\"}}\n",
                "{\"h\": {\"name\": \"Engine\"}, \"r\": {\"type\": \"stores\"}\n",
                "{\"h\": \"Engine\", \"r\": \"reads\", \"t\": \"config.yaml\"}\n",
            )
            .to_string());
        }
        Ok(String::new())
    }
}

fn manual() -> Document {
    let pages = [
        "Table of Contents\nGetting Started ....... 2\n  Installation ....... 2\n  Configuration ..... 3\nBilling ............ 4",
        "Getting Started\nInstallation\nDownload the package and run the installer.",
        "Configuration\nEdit config.yaml to point at your model endpoint.",
        "Billing\nInvoices are issued monthly.",
        "Appendix\nMiscellaneous notes.",
    ];
    Document::from_text("manual.md", &pages.join("\x0c"))
}

#[tokio::test]
async fn index_save_load_and_search() {
    let model = Arc::new(CannedModel);
    let tree = TreeIndexer::new(Arc::clone(&model)).index(&manual()).await.unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manual.bin");
    save_tree(&tree, &path).unwrap();
    let tree = load_tree(&path).unwrap();

    let getting_started = &tree.structure.nodes[0];
    assert_eq!(getting_started.title, "Getting Started");
    assert_eq!(getting_started.nodes.len(), 2);
    assert_eq!((getting_started.start_page, getting_started.end_page), (2, 3));
    assert_eq!(tree.structure.nodes[1].title, "Billing");
    assert_eq!(tree.structure.nodes[1].end_page, 5);

    let searcher = PageIndexSearcher::new(LlmRelevanceEvaluator::new(Arc::clone(&model)))
        .with_max_concurrency(2);
    let results = searcher.search_page_index(&tree, "how do I install it", 5).await;

    let sections: Vec<&str> = results.iter().map(|r| r.section.as_str()).collect();
    assert_eq!(sections, vec!["Installation", "Configuration"]);
    assert!(results[0].score > results[1].score);
    assert_eq!(results[0].filename, "manual.md");
    assert_eq!(results[1].content, "Configuration (Page 3-3)");
}

#[tokio::test]
async fn top_down_search_skips_pruned_branches() {
    let model = Arc::new(CannedModel);
    let tree = TreeIndexer::new(Arc::clone(&model)).index(&manual()).await.unwrap();

    let searcher = PageIndexSearcher::new(LlmRelevanceEvaluator::new(model))
        .with_strategy(SearchStrategy::TopDown { threshold: 0.5 });
    let results = searcher.search_page_index(&tree, "install", 5).await;

    // "Getting Started" scores 0 under the canned model, so its children are never reached.
    assert!(results.is_empty());
}

#[test]
fn triples_from_text() {
    let settings = KnowledgeGraphSettings {
        min_triples: 2,
        max_triples: 10,
        triples_per_k_tokens: 10,
        ..Default::default()
    };
    let scope = AgentScope::new("agent-7", "/tmp/workspace", "/tmp/agent-7");
    let extractor = TripleExtractor::new(CannedModel);
    let result = tokio_test::block_on(extractor.extract(ExtractionRequest {
        text: "The engine runs on Linux and reads config.yaml.",
        settings: &settings,
        scope: &scope,
    }))
    .unwrap();

    assert_eq!(result.target_triples, 2);
    assert_eq!(result.triples.len(), 2);
    assert_eq!(result.triples[0].r.kind, "runs_on");
    assert_eq!(result.triples[1].t.name, "config.yaml");
}

#[test]
fn rank_flat_results_with_config_defaults() {
    let hit = |path: &str, snippet: &str, score: f64| SearchResult {
        path: path.to_string(),
        snippet: snippet.to_string(),
        score,
        source: SearchSource::Memory,
        start_line: 1,
        end_line: 5,
    };
    let results = vec![
        hit("a.md", "install the engine on linux", 0.4),
        hit("b.md", "billing and invoices", 0.9),
        hit("c.md", "linux install guide", 0.8),
    ];

    let config = Config::default();
    let ranked = rank_with_config(results, "install linux", &config.retrieval);

    let paths: Vec<&str> = ranked.iter().map(|r| r.result.path.as_str()).collect();
    assert_eq!(paths, vec!["c.md", "a.md", "b.md"]);
    assert!((ranked[0].score - 0.9).abs() < 1e-9);
    assert!((ranked[2].score - 0.45).abs() < 1e-9);
}
