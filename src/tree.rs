//! Hierarchical page index of a document.
//!
//! A [`PageIndexTree`] owns one root [`PageNode`]; each node owns its
//! children outright, so the structure is a strict tree. Trees are built
//! once from TOC items and then only read during search.

use crate::error::{KnowledgeError, Result};
use crate::toc::TocItem;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Title of the synthetic root every tree hangs from.
pub const ROOT_TITLE: &str = "Document";

/// A section of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    /// Section title.
    pub title: String,

    /// Identifier unique within the tree.
    pub node_id: String,

    /// First page of the section (1-indexed).
    pub start_page: u32,

    /// Last page of the section (inclusive).
    pub end_page: u32,

    /// Optional short summary used for relevance judgments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Subsections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<PageNode>,
}

impl PageNode {
    /// Create a new leaf node.
    pub fn new(
        title: impl Into<String>,
        node_id: impl Into<String>,
        start_page: u32,
        end_page: u32,
    ) -> Self {
        Self {
            title: title.into(),
            node_id: node_id.into(),
            start_page,
            end_page,
            summary: None,
            nodes: Vec::new(),
        }
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Add a child node.
    pub fn add_child(&mut self, child: PageNode) {
        self.nodes.push(child);
    }

    pub fn is_leaf(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the page span (number of pages covered).
    pub fn page_span(&self) -> u32 {
        if self.end_page >= self.start_page {
            self.end_page - self.start_page + 1
        } else {
            0
        }
    }

    /// Recursively count all nodes in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.nodes.iter().map(|n| n.node_count()).sum::<usize>()
    }

    /// All leaf nodes in document order.
    pub fn leaves(&self) -> Vec<&PageNode> {
        if self.nodes.is_empty() {
            vec![self]
        } else {
            self.nodes.iter().flat_map(|n| n.leaves()).collect()
        }
    }

    /// Depth of this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.nodes.iter().map(|n| n.depth()).max().unwrap_or(0)
    }

    /// Follow child indices from this node.
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut PageNode> {
        match path.split_first() {
            None => Some(self),
            Some((&first, rest)) => self.nodes.get_mut(first)?.node_at_mut(rest),
        }
    }

    /// Format the tree as a string for display.
    pub fn format_tree(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let mut result = format!(
            "{}- {} [{}] (pages {}-{})\n",
            prefix, self.title, self.node_id, self.start_page, self.end_page
        );

        for child in &self.nodes {
            result.push_str(&child.format_tree(indent + 1));
        }

        result
    }

    fn check(&self) -> Result<()> {
        if self.start_page == 0 || self.end_page < self.start_page {
            return Err(KnowledgeError::TreeError(format!(
                "node '{}' has invalid page range {}-{}",
                self.node_id, self.start_page, self.end_page
            )));
        }
        self.nodes.iter().try_for_each(PageNode::check)
    }
}

/// The page index of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct PageIndexTree {
    /// Document name.
    pub doc_name: String,

    /// Optional document description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_description: Option<String>,

    /// Root of the section hierarchy.
    pub structure: PageNode,
}

impl PageIndexTree {
    /// Create a new tree.
    pub fn new(doc_name: impl Into<String>, structure: PageNode) -> Self {
        Self {
            doc_name: doc_name.into(),
            doc_description: None,
            structure,
        }
    }

    /// Get total node count, including the root.
    pub fn node_count(&self) -> usize {
        self.structure.node_count()
    }

    /// Get maximum depth of the tree.
    pub fn max_depth(&self) -> usize {
        self.structure.depth()
    }

    /// All leaf sections.
    pub fn leaves(&self) -> Vec<&PageNode> {
        self.structure.leaves()
    }

    /// Reject page ranges no search could make sense of.
    pub fn validate(&self) -> Result<()> {
        self.structure.check()
    }

    /// Format the entire tree for display.
    pub fn format(&self) -> String {
        let mut result = format!(
            "Document: {} ({} pages, {} sections)\n",
            self.doc_name,
            self.structure.end_page,
            self.node_count()
        );
        result.push_str(&"─".repeat(50));
        result.push('\n');
        result.push_str(&self.structure.format_tree(0));
        result
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Node id from level and a three-letter title prefix, plus a sequence
/// number so ids stay unique.
fn node_id_for(item: &TocItem, seq: usize) -> String {
    let prefix: String = item
        .title
        .chars()
        .take(3)
        .flat_map(char::to_uppercase)
        .map(|c| if c.is_ascii_uppercase() { c } else { 'X' })
        .collect();
    format!("{:02}{}{:03}", item.level, prefix, seq)
}

/// Build a tree from leveled TOC items.
///
/// Items nest by `level` under a synthetic root. A section's start page is
/// its page (or physical index), inheriting the previous start when
/// absent; it ends just before the next section starts, or at
/// `page_count` for the last one. Parents always span their children.
pub fn build_tree(items: &[TocItem], page_count: u32) -> PageNode {
    let page_count = page_count.max(1);
    let items: Vec<&TocItem> = items.iter().filter(|i| !i.title.trim().is_empty()).collect();

    if items.is_empty() {
        return PageNode::new(ROOT_TITLE, "0001", 1, page_count);
    }

    let mut starts = Vec::with_capacity(items.len());
    let mut previous = 1u32;
    for item in &items {
        let start = item
            .page
            .or(item.physical_index)
            .map(|p| p.clamp(1, i64::from(page_count)) as u32)
            .unwrap_or(previous);
        starts.push(start);
        previous = start;
    }

    // Stack of (level, node) for the open path from the root.
    let mut stack: Vec<(u32, PageNode)> =
        vec![(0, PageNode::new(ROOT_TITLE, "0000", 1, page_count))];

    for (i, item) in items.iter().enumerate() {
        let start = starts[i];
        let end = match starts.get(i + 1) {
            Some(&next) => start.max(next.saturating_sub(1)),
            None => start.max(page_count),
        };
        let node = PageNode::new(item.title.trim(), node_id_for(item, i + 1), start, end);
        let level = item.level.max(1);

        while stack.len() > 1 && stack.last().is_some_and(|(l, _)| *l >= level) {
            close_top(&mut stack);
        }
        stack.push((level, node));
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    let (_, mut root) = stack
        .pop()
        .unwrap_or_else(|| (0, PageNode::new(ROOT_TITLE, "0000", 1, page_count)));
    root.end_page = root.end_page.max(page_count);
    root
}

/// Pop the top of the stack into its parent, widening the parent's range.
fn close_top(stack: &mut Vec<(u32, PageNode)>) {
    if let Some((_, node)) = stack.pop() {
        if let Some((_, parent)) = stack.last_mut() {
            parent.start_page = parent.start_page.min(node.start_page);
            parent.end_page = parent.end_page.max(node.end_page);
            parent.add_child(node);
        }
    }
}

/// Split leaves spanning more than `max_pages` pages into parts.
///
/// A childless root is split the same way, so there is always something
/// finer than the whole document to search.
pub fn process_large_nodes(mut node: PageNode, max_pages: u32) -> PageNode {
    let max_pages = max_pages.max(1);

    if node.is_leaf() {
        if node.page_span() > max_pages {
            node.nodes = split_node(&node, max_pages);
        }
        return node;
    }

    let children = std::mem::take(&mut node.nodes);
    for child in children {
        if child.is_leaf() && child.page_span() > max_pages {
            node.nodes.extend(split_node(&child, max_pages));
        } else {
            node.nodes.push(process_large_nodes(child, max_pages));
        }
    }
    node
}

fn split_node(node: &PageNode, max_pages: u32) -> Vec<PageNode> {
    let parts = node.page_span().div_ceil(max_pages);
    (0..parts)
        .map(|i| {
            let start = node.start_page + i * max_pages;
            let end = (start + max_pages - 1).min(node.end_page);
            PageNode {
                title: format!("{} (Part {})", node.title, i + 1),
                node_id: format!("{}_{}", node.node_id, i),
                start_page: start,
                end_page: end,
                summary: node.summary.clone(),
                nodes: Vec::new(),
            }
        })
        .collect()
}
