//! Knowledge Engine CLI
//!
//! Index documents into page trees, search them, rank flat retrieval
//! results and extract knowledge-graph triples.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use knowledge_engine::{
    config::{Config, StrategyKind},
    context::{DocumentFormat, EngineContext},
    document::Document,
    graph::{AgentScope, write_triples_jsonl},
    persistence::{load_tree, save_tree, tree_exists, tree_size},
    ranking::{RankingRequest, RetrievalMode, SearchResult, rank},
    search::{SearchStrategy, extract_document_context},
    toc::{detect_toc, has_page_numbers, validate_toc_items},
    tree::PageIndexTree,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Knowledge Engine - hybrid retrieval ranking and LLM-assisted graph construction
#[derive(Parser)]
#[command(name = "knowledge-engine")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a page index for a document, or for every document in a directory
    Index {
        /// Document file or directory
        document: PathBuf,

        /// Output index file (or directory when indexing a directory)
        #[arg(short, long, default_value = "data/page_index.json")]
        output: PathBuf,

        /// Generate section summaries after building
        #[arg(long)]
        summarize: bool,
    },

    /// Search a page index
    Search {
        /// The search query
        query: String,

        /// Path to the index file
        #[arg(short, long, default_value = "data/page_index.json")]
        index: PathBuf,

        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,

        /// Tree walk: leaf-scan or top-down (defaults to the configured one)
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Original document, to print query-relevant context per result
        #[arg(short, long)]
        document: Option<PathBuf>,
    },

    /// Rank a JSON array of search results
    Rank {
        /// JSON file holding the candidate results
        results: PathBuf,

        /// The query the results answer
        query: String,

        /// semantic, keyword or hybrid
        #[arg(long)]
        mode: Option<RetrievalMode>,

        /// Semantic weight in hybrid mode
        #[arg(long)]
        alpha: Option<f64>,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Extract knowledge-graph triples from a text file
    Triples {
        /// Text file to extract from
        input: PathBuf,

        /// Write triples as JSON Lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Agent the extraction runs for
        #[arg(long, default_value = "main")]
        agent_id: String,

        /// Characters per extraction chunk
        #[arg(long, default_value_t = 12_000)]
        chunk_chars: usize,
    },

    /// Detect and structure a document's table of contents
    Toc {
        /// Text file to read
        input: PathBuf,

        /// Page count to validate against (defaults to the document's)
        #[arg(long)]
        pages: Option<u32>,
    },

    /// Display the tree structure of an index
    Show {
        #[arg(default_value = "data/page_index.json")]
        index: PathBuf,

        /// Output as JSON instead of formatted tree
        #[arg(long)]
        json: bool,
    },

    /// Show information about an index
    Info {
        #[arg(default_value = "data/page_index.json")]
        index: PathBuf,
    },

    /// Test LLM connection and local capabilities
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            document,
            output,
            summarize,
        } => cmd_index(document, output, summarize).await,
        Commands::Search {
            query,
            index,
            limit,
            strategy,
            document,
        } => cmd_search(query, index, limit, strategy, document).await,
        Commands::Rank {
            results,
            query,
            mode,
            alpha,
            min_score,
            top_k,
        } => cmd_rank(results, query, mode, alpha, min_score, top_k),
        Commands::Triples {
            input,
            output,
            agent_id,
            chunk_chars,
        } => cmd_triples(input, output, agent_id, chunk_chars).await,
        Commands::Toc { input, pages } => cmd_toc(input, pages).await,
        Commands::Show { index, json } => cmd_show(index, json),
        Commands::Info { index } => cmd_info(index),
        Commands::Test => cmd_test().await,
    }
}

async fn engine() -> Result<EngineContext> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(EngineContext::initialize(config).await)
}

fn require_index(index_path: &Path) -> Result<PageIndexTree> {
    if !tree_exists(index_path) {
        anyhow::bail!(
            "Index not found at '{}'. Run 'index' command first.",
            index_path.display()
        );
    }
    load_tree(index_path).context("Failed to load page index")
}

async fn cmd_index(document_path: PathBuf, output: PathBuf, summarize: bool) -> Result<()> {
    let ctx = engine().await?;
    println!("Using model: {}", ctx.config.llm.model);

    if !document_path.is_dir() {
        return index_one(&ctx, &document_path, &output, summarize).await;
    }

    let out_dir = output.with_extension("");
    let files: Vec<PathBuf> = WalkDir::new(&document_path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| DocumentFormat::from_path(path).is_ok())
        .collect();

    println!("Indexing {} documents from {}", files.len(), document_path.display());
    let mut failed = 0;
    for file in &files {
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
        let target = out_dir.join(format!("{stem}.json"));
        if let Err(e) = index_one(&ctx, file, &target, summarize).await {
            warn!(document = %file.display(), error = %e, "Indexing failed");
            failed += 1;
        }
    }
    println!(
        "\nIndexed {} of {} documents into {}",
        files.len() - failed,
        files.len(),
        out_dir.display()
    );
    Ok(())
}

async fn index_one(ctx: &EngineContext, path: &Path, output: &Path, summarize: bool) -> Result<()> {
    println!("\nIndexing document: {}", path.display());
    let start = Instant::now();

    let work_dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("converted");
    let document = ctx
        .load_document(path, &work_dir)
        .await
        .with_context(|| format!("Failed to load document '{}'", path.display()))?;
    println!("  Document: {} ({} pages)", document.name, document.page_count());

    let mut indexer = ctx.indexer();
    if summarize {
        indexer = indexer.summarizing();
    }
    let tree = indexer.index(&document).await.context("Failed to build page index")?;

    println!("  Sections:    {}", tree.node_count());
    println!("  Max depth:   {}", tree.max_depth());
    println!("  Build time:  {:.2?}", start.elapsed());

    save_tree(&tree, output).context("Failed to save page index")?;
    let size = tree_size(output)?;
    println!("  Saved to:    {} ({:.1} KB)", output.display(), size as f64 / 1024.0);
    Ok(())
}

async fn cmd_search(
    query: String,
    index_path: PathBuf,
    limit: usize,
    strategy: Option<StrategyKind>,
    document_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(strategy) = strategy {
        config.search.strategy = strategy;
    }
    config.validate().context("Invalid configuration")?;

    let tree = require_index(&index_path)?;
    let ctx = EngineContext::initialize(config).await;
    let searcher = ctx.searcher();

    let document = match &document_path {
        Some(path) => Some(Document::from_text_file(path).context("Failed to load document")?),
        None => None,
    };

    println!("Searching for: \"{}\"", query);
    let mode = match searcher.strategy() {
        SearchStrategy::LeafScan => "leaf scan".to_string(),
        SearchStrategy::TopDown { threshold } => format!("top-down (threshold {threshold})"),
    };
    println!("Strategy: {mode}\n");

    let start = Instant::now();
    let results = searcher.search_page_index(&tree, &query, limit).await;

    if results.is_empty() {
        println!("No relevant sections found.");
        return Ok(());
    }

    println!("Results:");
    println!("{}", "─".repeat(60));
    for (i, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {} [page {}] (score {:.2})",
            i + 1,
            result.section,
            result.page_number,
            result.score
        );
        println!("    {}", result.content);

        if let Some(document) = &document {
            let node_end = tree
                .leaves()
                .into_iter()
                .find(|n| n.title == result.section && n.start_page == result.page_number)
                .map(|n| n.end_page)
                .unwrap_or(result.page_number);
            let context = extract_document_context(
                &*ctx.client,
                &query,
                document,
                result.page_number,
                node_end,
            )
            .await;
            for line in context.lines().take(5) {
                println!("      {}", line);
            }
        }
        println!();
    }
    println!("{}", "─".repeat(60));
    println!("Found {} results in {:.2?}", results.len(), start.elapsed());
    Ok(())
}

fn cmd_rank(
    results_path: PathBuf,
    query: String,
    mode: Option<RetrievalMode>,
    alpha: Option<f64>,
    min_score: Option<f64>,
    top_k: Option<usize>,
) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    let retrieval = &mut config.retrieval;
    if let Some(mode) = mode {
        retrieval.mode = mode;
    }
    if let Some(alpha) = alpha {
        retrieval.hybrid_alpha = alpha;
    }
    if let Some(min_score) = min_score {
        retrieval.min_score = min_score;
    }
    if let Some(top_k) = top_k {
        retrieval.top_k = top_k;
    }
    config.validate_engine().context("Invalid ranking parameters")?;

    let raw = std::fs::read_to_string(&results_path)
        .with_context(|| format!("Failed to read '{}'", results_path.display()))?;
    let results: Vec<SearchResult> = serde_json::from_str(&raw)
        .context("Results must be a JSON array of search results")?;

    let candidates = results.len();
    let ranked = rank(RankingRequest::from_config(results, query, &config.retrieval));
    info!(candidates, kept = ranked.len(), mode = %config.retrieval.mode, "Ranked results");

    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

/// Split text into chunks of at most `max_chars` characters on line breaks.
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in text.lines() {
        let line_chars = line.chars().count() + 1;
        if current_chars + line_chars > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_chars += line_chars;
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn cmd_triples(
    input: PathBuf,
    output: Option<PathBuf>,
    agent_id: String,
    chunk_chars: usize,
) -> Result<()> {
    let ctx = engine().await?;
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;

    let workspace = std::env::current_dir().context("No working directory")?;
    let agent_dir = workspace.join(".knowledge-engine").join("agents").join(&agent_id);
    let scope = AgentScope::new(agent_id, workspace, agent_dir);

    let chunks = chunk_text(&text, chunk_chars);
    let triples = ctx
        .triple_extractor()
        .extract_chunks(&chunks, &ctx.config.graph, &scope)
        .await;

    match output {
        Some(path) => {
            write_triples_jsonl(&path, &triples).context("Failed to write triples")?;
            println!("Wrote {} triples to {}", triples.len(), path.display());
        }
        None => {
            for triple in &triples {
                println!("{}", serde_json::to_string(triple)?);
            }
        }
    }
    Ok(())
}

async fn cmd_toc(input: PathBuf, pages: Option<u32>) -> Result<()> {
    let ctx = engine().await?;
    let document = Document::from_text_file(&input).context("Failed to load document")?;
    let page_count = pages.unwrap_or_else(|| document.page_count());

    let detection = detect_toc(&document.front_matter(5));
    let structurer = ctx.toc_structurer();
    let result = match detection.content.as_deref() {
        Some(toc_text) => {
            println!("Table of contents detected.");
            structurer.transform_toc(toc_text, has_page_numbers(toc_text)).await
        }
        None => {
            println!("No table of contents; generating an outline.");
            structurer.generate_toc_from_text(&document.raw_content(), 20).await
        }
    };

    let items = validate_toc_items(&result.items, page_count);
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

fn cmd_show(index_path: PathBuf, json: bool) -> Result<()> {
    let tree = require_index(&index_path)?;

    if json {
        let json_str = tree.to_json().context("Failed to serialize tree")?;
        println!("{}", json_str);
    } else {
        println!("{}", tree.format());
    }

    Ok(())
}

fn cmd_info(index_path: PathBuf) -> Result<()> {
    let tree = require_index(&index_path)?;
    let size = tree_size(&index_path)?;

    println!("Page Index Information");
    println!("{}", "─".repeat(40));
    println!("  Document:     {}", tree.doc_name);
    println!("  Total pages:  {}", tree.structure.end_page);
    println!("  Sections:     {}", tree.node_count());
    println!("  Leaves:       {}", tree.leaves().len());
    println!("  Max depth:    {}", tree.max_depth());
    println!("  File size:    {:.1} KB", size as f64 / 1024.0);
    println!("  Index path:   {}", index_path.display());

    if let Some(desc) = &tree.doc_description {
        println!("  Description:  {}", desc);
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    let key_prefix: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_prefix);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let ctx = EngineContext::initialize(config).await;
    println!(
        "Document converter: {}",
        if ctx.capabilities.converter_available { "available" } else { "not installed" }
    );

    println!("Sending test request...");
    match ctx.client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text() {
        let text = "aaaa\nbbbb\ncccc\n";
        assert_eq!(chunk_text(text, 10), vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunk_text(text, 1_000).len(), 1);
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn test_cli_parses() {
        let args = [
            "knowledge-engine",
            "search",
            "refunds",
            "--strategy",
            "top-down",
            "-k",
            "3",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Search { strategy, limit, .. } => {
                assert_eq!(strategy, Some(StrategyKind::TopDown));
                assert_eq!(limit, 3);
            }
            _ => panic!("expected search"),
        }
    }
}
