//! LLM prompts for TOC structuring, tree search and triple extraction.

/// Collection of prompts used across the engine.
pub struct Prompts;

impl Prompts {
    /// Fill `{name}` placeholders in one pass.
    ///
    /// Substituted values are never rescanned, so text containing a
    /// placeholder-like `{query}` is copied through as written. Unknown
    /// placeholders are left in place.
    pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Transform a TOC whose entries end in page numbers.
    pub fn toc_transformer_with_pages() -> &'static str {
        r#"You are given a table of contents. Transform it into a JSON array.

Each element must contain:
- "title": the section title, without leader dots or the page number
- "page": the page number printed for the entry (integer)
- "level": the hierarchy depth, starting at 1

Entries look like "Title ........ 12": the trailing number after the leader dots is the page.
Numbered titles such as "1.2.3" imply level 3.

Example:
[
  {"title": "Chapter 1 Overview", "page": 1, "level": 1},
  {"title": "1.1 Background", "page": 2, "level": 2}
]

Directly return the JSON array. Do not output anything else."#
    }

    /// Transform a TOC without page numbers, inferring level from indentation.
    pub fn toc_transformer_indented() -> &'static str {
        r#"You are given a table of contents. Transform it into a JSON array.

Each element must contain:
- "title": the section title
- "level": the hierarchy depth, starting at 1

Infer the level from indentation: entries with no indentation are level 1, entries indented once are level 2, and so on.

Directly return the JSON array. Do not output anything else."#
    }

    /// Generate an outline from body text when the document has no TOC.
    pub fn generate_toc_from_text() -> &'static str {
        r#"You are an expert in extracting the chapter structure of documents.
From the document text provided, extract the main section titles and produce a table of contents.

Each element must contain:
- "title": the section title as written in the text
- "level": the hierarchy depth, starting at 1

Requirements:
1. Only extract main sections (at most {max_items} entries)
2. Set the level according to how titles nest
3. Return titles only, no section content

Directly return the JSON array. Do not output anything else."#
    }

    /// Judge how relevant one section is to a query.
    pub fn node_relevance() -> &'static str {
        r#"Judge how relevant the following document section is to the user's question.

User question: {query}

Section title: {title}
{summary}
Return a JSON object with:
- "relevance": a score between 0 and 1 (1 means highly relevant)
- "reason": a brief explanation

Directly return the JSON object. Do not output anything else."#
    }

    /// Summarize a section in at most ~100 characters.
    pub fn generate_node_summary() -> &'static str {
        r#"Write a concise summary (at most 100 characters) of the following document section.

Section title: {title}
Pages: {start_page}-{end_page}

Section content excerpt:
{content}

Return only the summary text, nothing else."#
    }

    /// Extract the query-relevant part of a page range.
    pub fn extract_context() -> &'static str {
        r#"From the text below, extract the content relevant to the user's question.

User question: {query}

Text:
{content}

Return only the relevant passages, keeping the key information."#
    }

    /// Extract knowledge-graph triples as JSON Lines.
    pub fn triple_extraction() -> &'static str {
        r#"Extract knowledge graph triples from the text below.
Return up to {target} triples in JSONL format.
Each line must be a JSON object with keys: h, r, t.
h and t must include a name field. r must include a type field.
Do not include explanations, code fences, or markdown. JSONL only.

Text:
{text}"#
    }

    /// System prompt for general document analysis.
    pub fn system_document_analyzer() -> &'static str {
        "You are an expert document analyzer. You help extract structure, navigate content, and answer questions about documents. Always respond with valid JSON when requested."
    }

    /// System prompt for knowledge-graph extraction.
    pub fn system_graph_extractor() -> &'static str {
        "You are a knowledge graph specialist. You extract entities and the relations between them from text, naming entities consistently."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::toc_transformer_with_pages().is_empty());
        assert!(!Prompts::toc_transformer_indented().is_empty());
        assert!(!Prompts::system_document_analyzer().is_empty());
        assert!(!Prompts::system_graph_extractor().is_empty());
    }

    #[test]
    fn test_fill_does_not_rescan_values() {
        let filled = Prompts::fill(
            "Q: {query}\nText: {content}",
            &[("content", "see {query} and {title}"), ("query", "refunds")],
        );
        assert_eq!(filled, "Q: refunds\nText: see {query} and {title}");
    }

    #[test]
    fn test_fill_keeps_json_braces() {
        let filled = Prompts::fill(r#"[{"title": "A"}] for {query}"#, &[("query", "x")]);
        assert_eq!(filled, r#"[{"title": "A"}] for x"#);
    }

    #[test]
    fn test_templates_carry_placeholders() {
        assert!(Prompts::generate_toc_from_text().contains("{max_items}"));
        assert!(Prompts::node_relevance().contains("{query}"));
        assert!(Prompts::node_relevance().contains("{summary}"));
        assert!(Prompts::generate_node_summary().contains("{content}"));
        assert!(Prompts::extract_context().contains("{query}"));
        assert!(Prompts::triple_extraction().contains("{target}"));
        assert!(Prompts::triple_extraction().contains("{text}"));
    }
}
