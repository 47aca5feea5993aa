//! Caption rewriter - batched LLM rewriting pipeline for short-video captions
//! and TTS scripts.
//!
//! A job reads a caption file (and optionally a TTS script), asks an
//! OpenAI-compatible chat-completions endpoint for N rewritten variants as
//! JSON, repairs near-valid responses, and fans the accepted variants out to
//! per-variant text files next to the sources.

pub mod config;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod repair;
pub mod text;
pub mod variants;

pub use config::{RewriteJob, StreamStyle};
pub use llm::{ChatCompletions, ChatMessage, MockChatClient, OpenAiCompatClient, StreamEvent};
pub use pipeline::{JobSummary, ProgressObserver, Rewriter, StdioObserver};
pub use text::LanguageFingerprint;
pub use variants::Variant;

/// Result type for rewrite operations
pub type Result<T> = std::result::Result<T, RewriteError>;

/// Error types for the rewrite pipeline
#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Response shape error: {0}")]
    Shape(String),

    #[error("giving up after {attempts} attempts: {last_error}; raw fragment: {raw_fragment}")]
    RetriesExhausted {
        attempts: u32,
        last_error: String,
        raw_fragment: String,
    },
}
