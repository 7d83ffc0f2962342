//! LLM client resilience layer (C5) and prompt assembly (C7 support).

pub mod client;
pub mod extract;
pub mod prompt;
pub mod retry;
pub mod token;

pub use client::LlmClient;
