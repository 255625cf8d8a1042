//! LLM provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod gemini;

pub use gemini::{ApiKey, DEFAULT_BASE_URL, GeminiBackend, GeminiBackendBuilder};
