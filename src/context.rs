//! Long-lived engine state.
//!
//! Whether the external document converter is installed is checked once,
//! when the [`EngineContext`] is created, and read from there afterwards.

use crate::config::Config;
use crate::document::Document;
use crate::error::{KnowledgeError, Result};
use crate::graph::TripleExtractor;
use crate::indexer::{IndexerOptions, TreeIndexer};
use crate::llm::LlmClient;
use crate::search::{LlmRelevanceEvaluator, PageIndexSearcher};
use crate::toc::TocStructurer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

const CONVERTER: &str = "pandoc";

/// How a file is turned into a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Read as is.
    Text,
    /// Converted to Markdown first.
    Convertible,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "markdown" => Ok(DocumentFormat::Text),
            "docx" | "doc" | "html" | "htm" => Ok(DocumentFormat::Convertible),
            _ => Err(KnowledgeError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// What the host offers beyond the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub converter_available: bool,
}

impl Capabilities {
    /// Check for the converter by running `pandoc --version`.
    pub async fn probe() -> Self {
        let converter_available = match Command::new(CONVERTER).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!(error = %e, "Document converter not found");
                false
            }
        };
        info!(converter_available, "Probed capabilities");
        Self { converter_available }
    }
}

/// Convert `input` to Markdown in `output_dir`, returning the new file.
pub async fn convert_to_markdown(
    input: &Path,
    output_dir: &Path,
    capabilities: &Capabilities,
) -> Result<PathBuf> {
    if !capabilities.converter_available {
        return Err(KnowledgeError::Conversion(format!(
            "{} is needed to convert '{}' but is not installed",
            CONVERTER,
            input.display()
        )));
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| KnowledgeError::io(output_dir, e))?;
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let output = output_dir.join(format!("{stem}.md"));

    let result = Command::new(CONVERTER)
        .arg(input)
        .args(["-t", "gfm", "-o"])
        .arg(&output)
        .output()
        .await
        .map_err(|e| KnowledgeError::io(input, e))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(input = %input.display(), "Document conversion failed");
        return Err(KnowledgeError::Conversion(stderr.trim().to_string()));
    }

    debug!(output = %output.display(), "Converted document");
    Ok(output)
}

/// Configuration, model client and capabilities, created once per process.
pub struct EngineContext {
    pub config: Config,
    pub client: Arc<LlmClient>,
    pub capabilities: Capabilities,
}

impl EngineContext {
    /// Probe capabilities and build the client.
    pub async fn initialize(config: Config) -> Self {
        let capabilities = Capabilities::probe().await;
        Self::with_capabilities(config, capabilities)
    }

    pub fn with_capabilities(config: Config, capabilities: Capabilities) -> Self {
        let client = Arc::new(LlmClient::new(config.llm.clone()));
        Self {
            config,
            client,
            capabilities,
        }
    }

    /// Load a document for indexing, converting it when needed.
    ///
    /// Converted Markdown is written to `work_dir`. The document keeps the
    /// original file name.
    pub async fn load_document(&self, path: &Path, work_dir: &Path) -> Result<Document> {
        if !path.exists() {
            return Err(KnowledgeError::DocumentNotFound(path.to_path_buf()));
        }

        match DocumentFormat::from_path(path)? {
            DocumentFormat::Text => Document::from_text_file(path),
            DocumentFormat::Convertible => {
                let converted = convert_to_markdown(path, work_dir, &self.capabilities).await?;
                let mut document = Document::from_text_file(&converted)?;
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    document.name = name.to_string();
                }
                document.path = Some(path.to_path_buf());
                Ok(document)
            }
        }
    }

    pub fn indexer(&self) -> TreeIndexer<Arc<LlmClient>> {
        TreeIndexer::with_options(
            Arc::clone(&self.client),
            IndexerOptions::from_config(&self.config.search),
        )
    }

    pub fn searcher(&self) -> PageIndexSearcher<LlmRelevanceEvaluator<Arc<LlmClient>>> {
        PageIndexSearcher::from_config(
            LlmRelevanceEvaluator::new(Arc::clone(&self.client)),
            &self.config.search,
        )
    }

    pub fn toc_structurer(&self) -> TocStructurer<Arc<LlmClient>> {
        TocStructurer::new(Arc::clone(&self.client))
    }

    pub fn triple_extractor(&self) -> TripleExtractor<Arc<LlmClient>> {
        TripleExtractor::new(Arc::clone(&self.client))
    }
}
