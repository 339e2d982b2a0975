//! Page-based documents.
//!
//! Plain text has no physical pages, so pages come from form feeds when
//! the text has them and from fixed runs of lines otherwise. The same line
//! arithmetic is used when reading page ranges back for context.

use crate::error::{KnowledgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines that make up one synthetic page.
pub const LINES_PER_PAGE: usize = 50;

const FORM_FEED: char = '\x0c';

/// A single page in a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: u32,
    /// Text content of the page.
    pub content: String,
}

impl Page {
    pub fn new(number: u32, content: String) -> Self {
        Self { number, content }
    }
}

/// A document consisting of one or more pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name, used as `docName` of its index.
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    pub pages: Vec<Page>,
}

impl Document {
    /// Split raw text into pages.
    pub fn from_text(name: impl Into<String>, content: &str) -> Self {
        let chunks: Vec<String> = if content.contains(FORM_FEED) {
            content
                .split(FORM_FEED)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect()
        } else {
            content
                .lines()
                .collect::<Vec<_>>()
                .chunks(LINES_PER_PAGE)
                .map(|lines| lines.join("\n"))
                .collect()
        };

        let mut pages: Vec<Page> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, text))
            .collect();
        if pages.is_empty() {
            pages.push(Page::new(1, String::new()));
        }

        Self {
            name: name.into(),
            path: None,
            pages,
        }
    }

    /// Load a text or Markdown file.
    pub fn from_text_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KnowledgeError::DocumentNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| KnowledgeError::io(path, e))?;

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        let mut document = Self::from_text(name, &content);
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a specific page by number (1-indexed).
    pub fn get_page(&self, number: u32) -> Option<&Page> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
    }

    /// Text of pages `start..=end` (1-indexed).
    pub fn content_range(&self, start: u32, end: u32) -> String {
        self.pages
            .iter()
            .filter(|p| p.number >= start && p.number <= end)
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All text, pages joined by blank lines.
    pub fn raw_content(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The first `n` pages, where a table of contents would sit.
    pub fn front_matter(&self, n: usize) -> String {
        self.pages
            .iter()
            .take(n)
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lines of `text` for pages `start..=end`, at [`LINES_PER_PAGE`] lines
/// per page. Out-of-range pages yield what exists, possibly nothing.
pub fn page_slice(text: &str, start_page: u32, end_page: u32) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let from = (start_page.saturating_sub(1) as usize * LINES_PER_PAGE).min(lines.len());
    let to = (end_page as usize * LINES_PER_PAGE).min(lines.len()).max(from);
    lines[from..to].join("\n")
}
