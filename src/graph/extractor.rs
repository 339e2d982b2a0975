//! LLM-driven triple extraction.
//!
//! The model is asked for JSON Lines. Its output is parsed line by line and
//! any line that isn't a usable triple is dropped; only a failed model call
//! is an error.

use crate::config::KnowledgeGraphSettings;
use crate::error::Result;
use crate::graph::estimator::compute_target_triples;
use crate::graph::triple::{KnowledgeTriple, triple_key};
use crate::llm::json::parse_json_lines;
use crate::llm::{CallOptions, Extracted, ModelCall, Prompts};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Input text beyond this many characters is not sent to the model.
const MAX_PROMPT_CHARS: usize = 16_000;

/// The agent an extraction runs on behalf of.
#[derive(Debug, Clone)]
pub struct AgentScope {
    pub agent_id: String,
    pub workspace_dir: PathBuf,
    pub agent_dir: PathBuf,
}

impl AgentScope {
    pub fn new(
        agent_id: impl Into<String>,
        workspace_dir: impl Into<PathBuf>,
        agent_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            workspace_dir: workspace_dir.into(),
            agent_dir: agent_dir.into(),
        }
    }

    /// Session key graph extraction runs under.
    pub fn session_key(&self) -> String {
        format!("kb-graph:{}", self.agent_id)
    }
}

/// Everything one extraction call needs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub text: &'a str,
    pub settings: &'a KnowledgeGraphSettings,
    pub scope: &'a AgentScope,
}

/// Triples recovered from one text, plus what the model actually said.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub triples: Vec<KnowledgeTriple>,
    pub raw_text: String,
    pub target_triples: usize,
}

/// Parse model output into triples, skipping malformed lines.
pub fn parse_triples(raw_text: &str) -> Vec<KnowledgeTriple> {
    let units = parse_json_lines(raw_text, KnowledgeTriple::from_value);
    Extracted::collect_parsed(units, "triple")
}

fn build_prompt(text: &str, target: usize) -> String {
    let clipped: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    let target = target.to_string();
    Prompts::fill(Prompts::triple_extraction(), &[("target", &target), ("text", &clipped)])
}

/// Extracts knowledge triples through a model.
pub struct TripleExtractor<M> {
    model: M,
}

impl<M: ModelCall> TripleExtractor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Extract triples from one text.
    ///
    /// Fails only when the model call itself fails.
    #[instrument(
        skip_all,
        fields(
            session = %request.scope.session_key(),
            workspace = %request.scope.workspace_dir.display(),
        )
    )]
    pub async fn extract(&self, request: ExtractionRequest<'_>) -> Result<ExtractionResult> {
        let target_triples = compute_target_triples(request.text, request.settings);
        let prompt = build_prompt(request.text, target_triples);
        let options = CallOptions::default().model(request.settings.model.clone());

        debug!(
            target_triples,
            provider = request.settings.provider.as_deref().unwrap_or("default"),
            "Requesting triples"
        );
        let raw = self
            .model
            .call(Prompts::system_graph_extractor(), &prompt, options)
            .await?;
        let raw_text = raw.trim().to_string();

        let mut triples = parse_triples(&raw_text);
        triples.truncate(target_triples);
        debug!(count = triples.len(), "Parsed triples");

        Ok(ExtractionResult {
            triples,
            raw_text,
            target_triples,
        })
    }

    /// Extract from each chunk of a document and merge the results.
    ///
    /// A chunk whose extraction fails contributes no triples. Duplicates
    /// (same head, relation and tail) keep their first occurrence.
    pub async fn extract_chunks(
        &self,
        chunks: &[String],
        settings: &KnowledgeGraphSettings,
        scope: &AgentScope,
    ) -> Vec<KnowledgeTriple> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let request = ExtractionRequest {
                text: chunk,
                settings,
                scope,
            };
            match self.extract(request).await {
                Ok(result) => {
                    for triple in result.triples {
                        if seen.insert(triple_key(&triple)) {
                            merged.push(triple);
                        }
                    }
                }
                Err(e) => {
                    warn!(chunk = index, error = %e, "Triple extraction failed; skipping chunk");
                }
            }
        }

        info!(chunks = chunks.len(), triples = merged.len(), "Extracted knowledge graph triples");
        merged
    }
}

/// Convenience function to extract triples with a one-off extractor.
pub async fn extract_triples_via_llm<M: ModelCall>(
    model: M,
    request: ExtractionRequest<'_>,
) -> Result<ExtractionResult> {
    TripleExtractor::new(model).extract(request).await
}
