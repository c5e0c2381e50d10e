//! Reasoning collaborator access.
//!
//! This module provides the client trait, the Ollama implementation and the
//! defensive JSON helpers used on every response.

pub mod client;
pub mod json;

pub use client::{ask, LlmConfig, OllamaClient, ReasoningClient};
