//! Knowledge triples and their wire forms.

use crate::error::{KnowledgeError, Result};
use crate::llm::Extracted;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// A head or tail entity. Extra attributes from the model are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl EntityRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }
}

/// A relation between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl RelationRef {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Map::new(),
        }
    }
}

/// Head entity, relation, tail entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeTriple {
    pub h: EntityRef,
    pub r: RelationRef,
    pub t: EntityRef,
}

impl KnowledgeTriple {
    pub fn new(head: &str, relation: &str, tail: &str) -> Self {
        Self {
            h: EntityRef::new(head),
            r: RelationRef::new(relation),
            t: EntityRef::new(tail),
        }
    }

    /// Normalize one model-emitted JSON value into a triple.
    ///
    /// `h`/`t` may be a bare string or an object with `name`; `r` a bare
    /// string or an object with `type`. Labels are trimmed and must be
    /// non-empty.
    pub fn from_value(value: Value) -> Extracted<Self> {
        let Value::Object(mut obj) = value else {
            return Extracted::skipped("triple is not a JSON object");
        };

        let (Some(h), Some(r), Some(t)) = (obj.remove("h"), obj.remove("r"), obj.remove("t")) else {
            return Extracted::skipped("triple is missing one of h, r, t");
        };

        match (normalize_part(h, "name"), normalize_part(r, "type"), normalize_part(t, "name")) {
            (Some((h_name, h_attrs)), Some((r_kind, r_attrs)), Some((t_name, t_attrs))) => {
                Extracted::Parsed(Self {
                    h: EntityRef {
                        name: h_name,
                        attributes: h_attrs,
                    },
                    r: RelationRef {
                        kind: r_kind,
                        attributes: r_attrs,
                    },
                    t: EntityRef {
                        name: t_name,
                        attributes: t_attrs,
                    },
                })
            }
            _ => Extracted::skipped("triple has a blank entity name or relation type"),
        }
    }
}

/// Pull the label out of a string-or-object part, keeping other fields.
fn normalize_part(part: Value, label: &str) -> Option<(String, Map<String, Value>)> {
    match part {
        Value::String(s) => non_blank(&s).map(|s| (s, Map::new())),
        Value::Object(mut obj) => {
            let text = match obj.remove(label)? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            non_blank(&text).map(|s| (s, obj))
        }
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Stable dedup key: SHA-256 of `head::relation::tail`.
pub fn triple_key(triple: &KnowledgeTriple) -> String {
    let raw = format!("{}::{}::{}", triple.h.name, triple.r.kind, triple.t.name);
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Write triples as JSON Lines, creating parent directories.
pub fn write_triples_jsonl(path: &Path, triples: &[KnowledgeTriple]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
        }
    }

    let mut out = String::new();
    for triple in triples {
        let line = serde_json::to_string(triple)
            .map_err(|e| KnowledgeError::Serialization(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }

    fs::write(path, out).map_err(|e| KnowledgeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_from_object_form() {
        let value = json!({
            "h": {"name": " Ada "},
            "r": {"type": "wrote"},
            "t": {"name": "Notes", "year": 1843}
        });
        let triple = KnowledgeTriple::from_value(value).ok().unwrap();
        assert_eq!(triple.h.name, "Ada");
        assert_eq!(triple.r.kind, "wrote");
        assert_eq!(triple.t.attributes["year"], json!(1843));
    }

    #[test]
    fn test_from_string_form() {
        let triple = KnowledgeTriple::from_value(json!({"h": "A", "r": "likes", "t": "B"}))
            .ok()
            .unwrap();
        assert_eq!(triple, KnowledgeTriple::new("A", "likes", "B"));
    }

    #[test]
    fn test_rejects_missing_or_blank_parts() {
        assert!(!KnowledgeTriple::from_value(json!({"h": "A", "r": "x"})).is_parsed());
        assert!(!KnowledgeTriple::from_value(json!({"h": "  ", "r": "x", "t": "B"})).is_parsed());
        let unnamed = json!({"h": {"label": "A"}, "r": "x", "t": "B"});
        assert!(!KnowledgeTriple::from_value(unnamed).is_parsed());
        assert!(!KnowledgeTriple::from_value(json!(["A", "x", "B"])).is_parsed());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(KnowledgeTriple::new("A", "rel", "B")).unwrap();
        assert_eq!(json, json!({"h": {"name": "A"}, "r": {"type": "rel"}, "t": {"name": "B"}}));
    }

    #[test]
    fn test_triple_key_is_stable() {
        let a = KnowledgeTriple::new("A", "rel", "B");
        let b = KnowledgeTriple::new("A", "rel", "B");
        let c = KnowledgeTriple::new("B", "rel", "A");
        assert_eq!(triple_key(&a), triple_key(&b));
        assert_ne!(triple_key(&a), triple_key(&c));
        assert_eq!(triple_key(&a).len(), 64);
    }

    #[test]
    fn test_write_triples_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph").join("triples.jsonl");
        let triples = vec![
            KnowledgeTriple::new("A", "r", "B"),
            KnowledgeTriple::new("B", "r", "C"),
        ];

        write_triples_jsonl(&path, &triples).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));
    }
}
