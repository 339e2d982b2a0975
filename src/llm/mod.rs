//! LLM integration module.
//!
//! Provides the model-call boundary, an OpenAI-compatible client for it,
//! the prompts used by the engine, and best-effort parsing of model output.

mod client;
pub mod json;
mod prompts;

pub use client::{CallOptions, LlmClient, LlmResponse, Message, ModelCall, Role, TokenUsage};
pub use json::Extracted;
pub use prompts::Prompts;

#[cfg(test)]
pub(crate) mod testing;
