use crate::{Result, RewriteError};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Environment variable holding the completion provider's API key.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// How streamed output is rendered while a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStyle {
    /// Collapse whitespace and flush in small time/size-bounded chunks
    Compact,
    /// Write every delta through unmodified
    Raw,
}

impl FromStr for StreamStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "compact" => Ok(StreamStyle::Compact),
            "raw" => Ok(StreamStyle::Raw),
            other => Err(format!("unknown stream style '{}', expected 'compact' or 'raw'", other)),
        }
    }
}

impl std::fmt::Display for StreamStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStyle::Compact => write!(f, "compact"),
            StreamStyle::Raw => write!(f, "raw"),
        }
    }
}

/// Configuration for one rewrite job. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RewriteJob {
    /// Caption source file (always required)
    pub caption: PathBuf,

    /// TTS source file; omit for caption-only jobs
    pub tts: Option<PathBuf>,

    /// Total variants to generate across all batches
    pub num: u32,

    /// How many variants to request per API call
    pub variants_per_request: u32,

    /// Model identifier, e.g. "deepseek-chat" or "deepseek-reasoner"
    pub model: String,

    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token budget per request
    pub max_tokens: u32,

    /// Retries per batch on transient or malformed responses
    pub retries: u32,

    /// Stream partial output while the request is in flight
    pub stream: bool,

    /// Display mode for streamed output
    pub stream_style: StreamStyle,

    /// Show intermediate reasoning deltas (reasoning-capable models only)
    pub show_reasoning: bool,

    /// Optional file that receives the full stream transcript verbatim
    pub stream_log: Option<PathBuf>,

    /// API key override; falls back to the environment when unset
    pub api_key: Option<String>,

    /// Skip TTS output even when a TTS source is configured
    pub caption_only: bool,
}

impl RewriteJob {
    /// Create a job for the given caption file with default settings.
    pub fn new(caption: impl Into<PathBuf>) -> Self {
        Self {
            caption: caption.into(),
            tts: None,
            num: 3,
            variants_per_request: 1,
            model: "deepseek-chat".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            temperature: 0.8,
            max_tokens: 3072,
            retries: 2,
            stream: false,
            stream_style: StreamStyle::Compact,
            show_reasoning: true,
            stream_log: None,
            api_key: None,
            caption_only: false,
        }
    }

    /// The TTS source path, honoring caption-only mode.
    pub fn tts_path(&self) -> Option<&Path> {
        if self.caption_only {
            None
        } else {
            self.tts.as_deref()
        }
    }

    /// Whether this job rewrites a TTS script alongside the caption.
    pub fn tts_mode(&self) -> bool {
        self.tts_path().is_some()
    }

    /// Effective per-request batch size (always at least 1).
    pub fn per_request(&self) -> u32 {
        self.variants_per_request.max(1)
    }

    /// Fail-fast validation of the job inputs, run before any network call.
    pub fn validate(&self) -> Result<()> {
        if !self.caption.is_file() {
            return Err(RewriteError::Configuration(format!(
                "caption file not found: {}",
                self.caption.display()
            )));
        }

        if let Some(tts) = self.tts_path() {
            if !tts.is_file() {
                return Err(RewriteError::Configuration(format!(
                    "TTS file not found: {}",
                    tts.display()
                )));
            }
        }

        if self.num == 0 {
            return Err(RewriteError::Configuration(
                "at least one variant must be requested".to_string(),
            ));
        }

        Url::parse(&self.base_url).map_err(|e| {
            RewriteError::Configuration(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;

        Ok(())
    }

    /// Resolve the API key from the override or the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref() {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        env::var(API_KEY_ENV).map_err(|_| {
            RewriteError::Configuration(format!(
                "{} environment variable is not set",
                API_KEY_ENV
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let job = RewriteJob::new("caption.txt");
        assert_eq!(job.num, 3);
        assert_eq!(job.variants_per_request, 1);
        assert_eq!(job.model, "deepseek-chat");
        assert_eq!(job.base_url, "https://api.deepseek.com");
        assert_eq!(job.retries, 2);
        assert!(!job.stream);
        assert!(job.show_reasoning);
        assert!(!job.tts_mode());
    }

    #[test]
    fn test_caption_only_overrides_tts() {
        let mut job = RewriteJob::new("caption.txt");
        job.tts = Some(PathBuf::from("tts.txt"));
        assert!(job.tts_mode());

        job.caption_only = true;
        assert!(!job.tts_mode());
        assert!(job.tts_path().is_none());
    }

    #[test]
    fn test_per_request_clamps_to_one() {
        let mut job = RewriteJob::new("caption.txt");
        job.variants_per_request = 0;
        assert_eq!(job.per_request(), 1);
    }

    #[test]
    fn test_validate_rejects_missing_caption() {
        let job = RewriteJob::new("/nonexistent/caption.txt");
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("caption file not found"));
    }

    #[test]
    fn test_validate_rejects_zero_variants() {
        let dir = tempfile::tempdir().unwrap();
        let caption = dir.path().join("caption.txt");
        std::fs::write(&caption, "hello").unwrap();

        let mut job = RewriteJob::new(&caption);
        job.num = 0;
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let caption = dir.path().join("caption.txt");
        std::fs::write(&caption, "hello").unwrap();

        let mut job = RewriteJob::new(&caption);
        job.base_url = "not a url".to_string();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_stream_style_parsing() {
        assert_eq!("compact".parse::<StreamStyle>().unwrap(), StreamStyle::Compact);
        assert_eq!("raw".parse::<StreamStyle>().unwrap(), StreamStyle::Raw);
        assert!("verbose".parse::<StreamStyle>().is_err());
    }

    #[test]
    fn test_api_key_override_wins() {
        let mut job = RewriteJob::new("caption.txt");
        job.api_key = Some("sk-test".to_string());
        assert_eq!(job.resolve_api_key().unwrap(), "sk-test");
    }
}
