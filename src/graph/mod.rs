//! Knowledge-graph construction from free text.
//!
//! Sizing the request ([`estimator`]), prompting and parsing ([`extractor`]),
//! and the triple type itself ([`triple`]). Merging triples into a persistent
//! graph is left to the graph store.

pub mod estimator;
pub mod extractor;
pub mod triple;

pub use estimator::compute_target_triples;
pub use extractor::{
    AgentScope, ExtractionRequest, ExtractionResult, TripleExtractor, extract_triples_via_llm,
    parse_triples,
};
pub use triple::{EntityRef, KnowledgeTriple, RelationRef, triple_key, write_triples_jsonl};
