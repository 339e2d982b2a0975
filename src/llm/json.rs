//! Best-effort structured extraction from model text.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or code
//! fences, or emit the odd broken line. Everything here works per unit: a
//! unit either parses or is skipped with a reason, and callers fold the
//! units into whatever survived.

use serde_json::Value;
use tracing::debug;

/// Outcome of parsing one unit (a line, an array element, a response).
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Parsed(T),
    Skipped(String),
}

impl<T> Extracted<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Extracted::Skipped(reason.into())
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Extracted::Parsed(value) => Some(value),
            Extracted::Skipped(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Extracted::Parsed(_))
    }

    /// Keep the parsed values in order, logging every skip.
    pub fn collect_parsed<I>(units: I, what: &str) -> Vec<T>
    where
        I: IntoIterator<Item = Extracted<T>>,
    {
        let mut out = Vec::new();
        let mut skipped = 0usize;
        for unit in units {
            match unit {
                Extracted::Parsed(value) => out.push(value),
                Extracted::Skipped(reason) => {
                    skipped += 1;
                    debug!(unit = what, %reason, "Skipped malformed unit");
                }
            }
        }
        if skipped > 0 {
            debug!(unit = what, kept = out.len(), skipped, "Recovered partial model output");
        }
        out
    }
}

/// Remove markdown code fences (```json, ```jsonl, ```) anywhere in the text.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let lower = rest.to_ascii_lowercase();
        if lower.starts_with("jsonl") {
            rest = &rest[5..];
        } else if lower.starts_with("json") {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// The balanced array or object opening at byte `start`.
///
/// Bracket matching is string-aware so braces inside string literals don't
/// end the scan early.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let open = text[start..].chars().next()?;
    let close = match open {
        '[' => ']',
        '{' => '}',
        _ => return None,
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull the first well-formed JSON value out of a model response.
///
/// Tries the whole text, then the body of a fenced block, then each
/// balanced array or object in order of where it opens. A bracketed aside
/// that does not parse is skipped.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let unfenced = strip_code_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(&unfenced) {
        return Some(value);
    }

    unfenced
        .match_indices(['[', '{'])
        .filter_map(|(start, _)| balanced_span(&unfenced, start))
        .find_map(|span| serde_json::from_str::<Value>(span).ok())
}

/// Pull a JSON array out of a response.
///
/// An object wrapping a single array field (`{"items": [...]}`) is unwrapped.
pub fn extract_json_array(response: &str) -> Extracted<Vec<Value>> {
    match extract_json(response) {
        Some(Value::Array(items)) => Extracted::Parsed(items),
        Some(Value::Object(map)) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => Extracted::Parsed(items),
                _ => Extracted::skipped("response object does not wrap a single array"),
            }
        }
        Some(_) => Extracted::skipped("response is not a JSON array"),
        None => Extracted::skipped("no JSON found in response"),
    }
}

/// Parse JSON-Lines output, one unit per non-empty line.
///
/// A payload that is itself one JSON array is accepted too; each element
/// becomes a unit. `convert` maps a parsed value into `T` or a skip reason.
pub fn parse_json_lines<T, F>(text: &str, convert: F) -> Vec<Extracted<T>>
where
    F: Fn(Value) -> Extracted<T>,
{
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    if cleaned.starts_with('[') && cleaned.ends_with(']') {
        return match serde_json::from_str::<Vec<Value>>(&cleaned) {
            Ok(values) => values.into_iter().map(&convert).collect(),
            Err(e) => vec![Extracted::skipped(format!("invalid JSON array: {}", e))],
        };
    }

    cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) => convert(value),
            Err(e) => Extracted::skipped(format!("invalid JSON line: {}", e)),
        })
        .collect()
}

/// Read a number that may have been emitted as a JSON string.
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
