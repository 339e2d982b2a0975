//! Builds a page index tree for a document.
//!
//! 1. Look for a table of contents in the document's front matter
//! 2. Structure it with the model, or outline the body text when there is
//!    none (or structuring yields nothing)
//! 3. Clamp pages to the document
//! 4. Nest items into a tree and split oversized sections
//! 5. Optionally summarize sections for sharper relevance judgments

use crate::config::SearchConfig;
use crate::document::Document;
use crate::error::Result;
use crate::llm::ModelCall;
use crate::search::summarize_tree;
use crate::toc::{TocStructurer, detect_toc, has_page_numbers, validate_toc_items};
use crate::tree::{PageIndexTree, build_tree, process_large_nodes};
use tracing::{debug, info, instrument};

/// Options for tree index generation.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Leading pages scanned for a table of contents.
    pub front_matter_pages: usize,
    /// Most outline entries requested when there is no TOC.
    pub max_outline_items: usize,
    /// Leaves spanning more pages than this are split.
    pub max_pages_per_node: u32,
    /// Generate section summaries after building.
    pub summarize: bool,
    /// Concurrent summary calls.
    pub max_concurrency: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            front_matter_pages: 5,
            max_outline_items: 20,
            max_pages_per_node: 10,
            summarize: false,
            max_concurrency: 8,
        }
    }
}

impl IndexerOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_pages_per_node: config.max_pages_per_node,
            max_concurrency: config.max_concurrency,
            ..Default::default()
        }
    }
}

/// Tree indexer driven by a model.
pub struct TreeIndexer<M> {
    structurer: TocStructurer<M>,
    model: M,
    options: IndexerOptions,
}

impl<M: ModelCall + Clone> TreeIndexer<M> {
    pub fn new(model: M) -> Self {
        Self::with_options(model, IndexerOptions::default())
    }

    pub fn with_options(model: M, options: IndexerOptions) -> Self {
        Self {
            structurer: TocStructurer::new(model.clone()),
            model,
            options,
        }
    }

    /// Also generate section summaries.
    pub fn summarizing(mut self) -> Self {
        self.options.summarize = true;
        self
    }

    /// Build a tree index for a document.
    ///
    /// Model failures degrade the outline rather than fail the build: a
    /// document the model cannot outline indexes as a single root split
    /// into page runs.
    #[instrument(skip_all, fields(doc = %document.name, pages = document.page_count()))]
    pub async fn index(&self, document: &Document) -> Result<PageIndexTree> {
        let page_count = document.page_count();
        let front_matter = document.front_matter(self.options.front_matter_pages);
        let detection = detect_toc(&front_matter);

        let mut items = Vec::new();
        if let Some(toc_text) = detection.content.as_deref() {
            let with_pages = has_page_numbers(toc_text);
            debug!(with_pages, "Structuring detected TOC");
            items = self.structurer.transform_toc(toc_text, with_pages).await.items;
        }
        if items.is_empty() {
            debug!("No usable TOC; outlining body text");
            items = self
                .structurer
                .generate_toc_from_text(&document.raw_content(), self.options.max_outline_items)
                .await
                .items;
        }

        let items = validate_toc_items(&items, page_count);
        let root = build_tree(&items, page_count);
        let root = process_large_nodes(root, self.options.max_pages_per_node);

        let mut tree = PageIndexTree::new(document.name.clone(), root);
        tree.validate()?;

        if self.options.summarize {
            summarize_tree(&self.model, &mut tree, document, self.options.max_concurrency).await;
        }

        info!(
            nodes = tree.node_count(),
            depth = tree.max_depth(),
            from_toc = detection.has_toc,
            "Built page index"
        );
        Ok(tree)
    }
}
