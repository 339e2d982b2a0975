//! Table-of-contents detection and structuring.
//!
//! Detection is a plain marker search. Turning a TOC (or, failing that, the
//! body text) into leveled items is done by the model; anything it returns
//! that can't be read degrades to an empty list.

use crate::llm::json::{extract_json_array, lenient_f64};
use crate::llm::{CallOptions, Extracted, ModelCall, Prompts};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Phrases that mark a table of contents, checked in order.
pub const TOC_MARKERS: &[&str] = &["table of contents", "contents", "目录", "目 录"];

/// Body text beyond this many characters is not sent when generating a TOC.
const MAX_OUTLINE_INPUT_CHARS: usize = 10_000;

/// "Title ....... 12" or "Title     12" at the end of a line.
static PAGE_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:\.{2,}|…+|\s{2,}|\t)\s*\d{1,4}\s*$").expect("valid page-number regex")
});

/// One entry of a table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocItem {
    pub title: String,
    /// Nesting depth, always at least 1.
    pub level: u32,
    /// Printed page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Physical page index in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_index: Option<i64>,
}

impl TocItem {
    pub fn new(title: impl Into<String>, level: u32) -> Self {
        Self {
            title: title.into(),
            level: level.max(1),
            page: None,
            physical_index: None,
        }
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Read one array element of a model response.
    ///
    /// `title` is required. `level` falls back to the depth of a
    /// `structure` index like "1.2.3", then to 1. Page fields accept
    /// numbers, numeric strings and `<physical_index_N>` tags.
    pub fn from_value(value: Value) -> Extracted<Self> {
        let Value::Object(obj) = value else {
            return Extracted::skipped("TOC entry is not an object");
        };

        let title = match obj.get("title") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Extracted::skipped("TOC entry has no title"),
        };

        let level = obj
            .get("level")
            .and_then(lenient_f64)
            .map(|l| l.round().max(1.0) as u32)
            .or_else(|| {
                obj.get("structure")
                    .and_then(Value::as_str)
                    .map(|s| s.split('.').filter(|p| !p.trim().is_empty()).count() as u32)
            })
            .unwrap_or(1)
            .max(1);

        let page = obj.get("page").and_then(page_value);
        let physical_index = obj
            .get("physicalIndex")
            .or_else(|| obj.get("physical_index"))
            .and_then(page_value);

        Extracted::Parsed(Self {
            title,
            level,
            page,
            physical_index,
        })
    }
}

fn page_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => parse_page_number(s).map(i64::from),
        _ => None,
    }
}

/// Result of scanning text for a TOC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocDetection {
    pub has_toc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Items produced by a transformation, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocTransformResult {
    pub items: Vec<TocItem>,
}

/// Case-insensitive search for any TOC marker. First match wins.
pub fn detect_toc(text: &str) -> TocDetection {
    let lower = text.to_lowercase();
    match TOC_MARKERS.iter().find(|marker| lower.contains(*marker)) {
        Some(marker) => {
            debug!(marker, "Detected table of contents");
            TocDetection {
                has_toc: true,
                content: Some(text.to_string()),
            }
        }
        None => TocDetection {
            has_toc: false,
            content: None,
        },
    }
}

/// Whether TOC lines end in page numbers (leader dots or wide gaps).
pub fn has_page_numbers(toc_text: &str) -> bool {
    PAGE_NUMBER_LINE.is_match(toc_text)
}

/// Keep only the digits of `page`; zero or nothing is no page.
pub fn parse_page_number(page: &str) -> Option<u32> {
    let digits: String = page.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Clamp page fields into `[1, page_count]`.
///
/// Items without a page (or with page 0) keep none.
pub fn validate_toc_items(items: &[TocItem], page_count: u32) -> Vec<TocItem> {
    let upper = i64::from(page_count.max(1));
    let clamp = |page: Option<i64>| page.filter(|p| *p != 0).map(|p| p.clamp(1, upper));

    items
        .iter()
        .map(|item| TocItem {
            title: item.title.clone(),
            level: item.level.max(1),
            page: clamp(item.page),
            physical_index: clamp(item.physical_index),
        })
        .collect()
}

/// Parse a model response into TOC items; unreadable input yields none.
pub fn parse_toc_items(response: &str) -> Vec<TocItem> {
    match extract_json_array(response) {
        Extracted::Parsed(values) => {
            Extracted::collect_parsed(values.into_iter().map(TocItem::from_value), "toc item")
        }
        Extracted::Skipped(reason) => {
            warn!(%reason, "Could not read TOC from model response");
            Vec::new()
        }
    }
}

/// Turns TOC text or body text into structured items via a model.
pub struct TocStructurer<M> {
    model: M,
}

impl<M: ModelCall> TocStructurer<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Structure a detected TOC.
    ///
    /// With page numbers the model strips leader dots and reads pages;
    /// without, it infers levels from indentation.
    pub async fn transform_toc(
        &self,
        toc_text: &str,
        has_page_numbers: bool,
    ) -> TocTransformResult {
        let prompt = if has_page_numbers {
            Prompts::toc_transformer_with_pages()
        } else {
            Prompts::toc_transformer_indented()
        };

        match self.model.call(prompt, toc_text, CallOptions::default()).await {
            Ok(response) => {
                let items = parse_toc_items(&response);
                info!(items = items.len(), has_page_numbers, "Transformed table of contents");
                TocTransformResult { items }
            }
            Err(e) => {
                warn!(error = %e, "Failed to transform TOC");
                TocTransformResult::default()
            }
        }
    }

    /// Ask the model for an outline of body text, at most `max_items` long.
    pub async fn generate_toc_from_text(&self, text: &str, max_items: usize) -> TocTransformResult {
        let max_items_text = max_items.to_string();
        let prompt = Prompts::fill(
            Prompts::generate_toc_from_text(),
            &[("max_items", &max_items_text)],
        );
        let excerpt: String = text.chars().take(MAX_OUTLINE_INPUT_CHARS).collect();

        match self.model.call(&prompt, &excerpt, CallOptions::default()).await {
            Ok(response) => {
                let mut items = parse_toc_items(&response);
                items.truncate(max_items);
                info!(items = items.len(), "Generated table of contents from text");
                TocTransformResult { items }
            }
            Err(e) => {
                warn!(error = %e, "Failed to generate TOC");
                TocTransformResult::default()
            }
        }
    }
}
