//! Knowledge Engine - hybrid retrieval ranking and LLM-assisted graph construction.
//!
//! Turns raw scored search hits, hierarchical document structure and raw
//! model text into consistent, bounded, ranked output.
//!
//! # Overview
//!
//! - **Ranking** fuses semantic and keyword evidence into one ordered,
//!   capped result list ([`ranking`]).
//! - **Graph extraction** asks a model for knowledge triples sized to the
//!   input text, keeping whatever lines parse ([`graph`]).
//! - **TOC structuring** detects and structures a document's outline
//!   ([`toc`]), from which a page index tree is built ([`tree`],
//!   [`indexer`]).
//! - **Page index search** judges sections in parallel and ranks them
//!   ([`search`]).
//!
//! Every model interaction goes through [`llm::ModelCall`], so any
//! component can run against a fake model.
//!
//! # Quick Start
//!
//! ```no_run
//! use knowledge_engine::{
//!     config::Config,
//!     context::EngineContext,
//!     persistence::save_tree,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!     let ctx = EngineContext::initialize(config).await;
//!
//!     let document = ctx.load_document(Path::new("manual.md"), Path::new("data")).await?;
//!     let tree = ctx.indexer().index(&document).await?;
//!     save_tree(&tree, Path::new("data/manual.json"))?;
//!
//!     for hit in ctx.searcher().search_page_index(&tree, "how do refunds work", 5).await {
//!         println!("{:.2} {} (page {})", hit.score, hit.section, hit.page_number);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod llm;
pub mod persistence;
pub mod ranking;
pub mod search;
pub mod toc;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use context::{Capabilities, EngineContext};
pub use document::Document;
pub use error::{KnowledgeError, Result};
pub use graph::{KnowledgeTriple, TripleExtractor, compute_target_triples};
pub use indexer::TreeIndexer;
pub use llm::{LlmClient, ModelCall};
pub use persistence::{load_tree, save_tree};
pub use ranking::{RankedResult, RankingRequest, RetrievalMode, SearchResult, rank};
pub use search::{PageIndexSearchResult, PageIndexSearcher, RelevanceEvaluator, SearchStrategy};
pub use toc::{TocItem, TocStructurer};
pub use tree::{PageIndexTree, PageNode};
