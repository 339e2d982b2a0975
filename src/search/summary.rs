//! Section summaries and query-focused context.
//!
//! Both are conveniences around search: summaries sharpen relevance
//! judgments, context extraction trims a hit down to what answers the
//! query. Neither ever fails; a model error falls back to less.

use crate::document::{Document, page_slice};
use crate::llm::{CallOptions, ModelCall, Prompts};
use crate::tree::{PageIndexTree, PageNode};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Summaries are cut to this many characters.
pub const MAX_SUMMARY_CHARS: usize = 100;

/// Section text sent for summarization is cut to this many characters.
const SUMMARY_INPUT_CHARS: usize = 2_000;

/// Page text longer than this is condensed by the model.
pub const CONTEXT_THRESHOLD_CHARS: usize = 2_000;

/// What is kept of the page text when condensing fails.
pub const CONTEXT_FALLBACK_CHARS: usize = 1_000;

const CONTEXT_MAX_TOKENS: u32 = 1_000;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Summarize one section from its text.
///
/// Returns an empty string when the model call fails.
pub async fn generate_node_summary<M: ModelCall + ?Sized>(
    model: &M,
    node: &PageNode,
    text: &str,
) -> String {
    let prompt = Prompts::fill(
        Prompts::generate_node_summary(),
        &[
            ("title", &node.title),
            ("start_page", &node.start_page.to_string()),
            ("end_page", &node.end_page.to_string()),
            ("content", &truncate_chars(text, SUMMARY_INPUT_CHARS)),
        ],
    );

    match model
        .call(Prompts::system_document_analyzer(), &prompt, CallOptions::default())
        .await
    {
        Ok(summary) => truncate_chars(summary.trim(), MAX_SUMMARY_CHARS),
        Err(e) => {
            warn!(node = %node.title, error = %e, "Failed to summarize section");
            String::new()
        }
    }
}

/// Every node below the root with no summary yet, as its child-index path
/// and a childless copy.
fn unsummarized(node: &PageNode, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, PageNode)>) {
    for (i, child) in node.nodes.iter().enumerate() {
        path.push(i);
        if child.summary.is_none() {
            let shell = PageNode::new(
                child.title.clone(),
                child.node_id.clone(),
                child.start_page,
                child.end_page,
            );
            out.push((path.clone(), shell));
        }
        unsummarized(child, path, out);
        path.pop();
    }
}

/// Fill in missing summaries, at most `max_concurrency` calls at a time.
///
/// Sections whose summary comes back empty stay unsummarized. Returns how
/// many summaries were added.
pub async fn summarize_tree<M: ModelCall + ?Sized>(
    model: &M,
    tree: &mut PageIndexTree,
    document: &Document,
    max_concurrency: usize,
) -> usize {
    let mut jobs = Vec::new();
    unsummarized(&tree.structure, &mut Vec::new(), &mut jobs);

    let summaries: Vec<(Vec<usize>, String)> = stream::iter(jobs)
        .map(|(path, node)| async move {
            let text = document.content_range(node.start_page, node.end_page);
            let summary = generate_node_summary(model, &node, &text).await;
            (path, summary)
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;

    let mut added = 0;
    for (path, summary) in summaries {
        if summary.is_empty() {
            continue;
        }
        if let Some(node) = tree.structure.node_at_mut(&path) {
            node.summary = Some(summary);
            added += 1;
        }
    }

    info!(doc = %tree.doc_name, added, "Summarized sections");
    added
}

/// Query-relevant text from pages `start_page..=end_page` of `full_text`,
/// paged at [`LINES_PER_PAGE`](crate::document::LINES_PER_PAGE) lines.
///
/// Short page text is returned whole. Longer text is condensed by the
/// model, or cut to its first [`CONTEXT_FALLBACK_CHARS`] characters when
/// that fails.
pub async fn extract_context<M: ModelCall + ?Sized>(
    model: &M,
    query: &str,
    full_text: &str,
    start_page: u32,
    end_page: u32,
) -> String {
    let page_text = page_slice(full_text, start_page, end_page);
    condense_pages(model, query, page_text, start_page, end_page).await
}

/// Like [`extract_context`], but reads the pages from `document` so the
/// range lines up with the page numbers its tree was built from.
pub async fn extract_document_context<M: ModelCall + ?Sized>(
    model: &M,
    query: &str,
    document: &Document,
    start_page: u32,
    end_page: u32,
) -> String {
    let page_text = document.content_range(start_page, end_page);
    condense_pages(model, query, page_text, start_page, end_page).await
}

async fn condense_pages<M: ModelCall + ?Sized>(
    model: &M,
    query: &str,
    page_text: String,
    start_page: u32,
    end_page: u32,
) -> String {
    if page_text.chars().count() <= CONTEXT_THRESHOLD_CHARS {
        return page_text;
    }

    let prompt = Prompts::fill(
        Prompts::extract_context(),
        &[("query", query), ("content", &page_text)],
    );
    let options = CallOptions::default().max_tokens(CONTEXT_MAX_TOKENS);

    match model
        .call(Prompts::system_document_analyzer(), &prompt, options)
        .await
    {
        Ok(context) => {
            debug!(start_page, end_page, "Condensed page context");
            context.trim().to_string()
        }
        Err(e) => {
            warn!(error = %e, "Context extraction failed; using leading text");
            truncate_chars(&page_text, CONTEXT_FALLBACK_CHARS)
        }
    }
}
