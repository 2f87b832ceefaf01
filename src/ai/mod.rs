//! AI generation client
//!
//! Turns source code into structural analyses and generated test files via
//! an OpenRouter-compatible chat-completions endpoint, with ordered model
//! fallback and a per-client round-robin cursor.

pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::{
    AttemptOutcome, CompletionRequest, CompletionTransport, GenerationClient, OpenRouterTransport,
};
pub use models::ModelRotation;
pub use parse::{extract_code, parse_structural_analysis, StructuralAnalysis};
