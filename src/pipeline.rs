//! Orchestration loop: batches requests until the requested variant count is
//! written, retrying transient and malformed responses per batch.
//!
//! Each batch moves through requesting, parsing and writing; request and
//! parse failures share one per-batch retry budget with linearly increasing
//! backoff. Already-written variants are never rolled back.

use crate::config::RewriteJob;
use crate::llm::{
    drive_completion, ChatCompletions, OpenAiCompatClient, SamplingParams, StreamOptions,
};
use crate::prompt::PromptBuilder;
use crate::text::{split_caption_and_tags, LanguageFingerprint};
use crate::variants::{normalize_response, Variant};
use crate::{Result, RewriteError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKOFF_STEP_MS: u64 = 1200;
const RAW_FRAGMENT_CHARS: usize = 800;

/// Observer for progress/log lines emitted by a running job.
///
/// Lets a hosting UI or service collect output without being coupled to this
/// crate's logging; both hooks may be called from whatever thread runs the
/// job.
pub trait ProgressObserver: Send + Sync {
    fn on_output_line(&self, line: &str);
    fn on_error_line(&self, line: &str);
}

/// Observer that forwards lines to stdout/stderr.
pub struct StdioObserver;

impl ProgressObserver for StdioObserver {
    fn on_output_line(&self, line: &str) {
        println!("{}", line);
    }

    fn on_error_line(&self, line: &str) {
        eprintln!("{}", line);
    }
}

/// Summary of a completed job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub variants_written: u32,
    pub batches: u32,
    pub batch_sizes: Vec<u32>,
}

/// Runs one rewrite job against a chat-completion backend.
pub struct Rewriter {
    job: RewriteJob,
    client: Box<dyn ChatCompletions>,
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter").field("job", &self.job).finish_non_exhaustive()
    }
}

impl Rewriter {
    /// Build a rewriter with the real HTTP client. Fails fast on
    /// configuration problems, before any network call.
    pub fn new(job: RewriteJob) -> Result<Self> {
        job.validate()?;
        let api_key = job.resolve_api_key()?;
        let client = OpenAiCompatClient::new(&job.base_url, api_key)?;
        Ok(Self {
            job,
            client: Box::new(client),
        })
    }

    /// Build a rewriter around a custom backend (tests, embedders).
    pub fn with_client(job: RewriteJob, client: Box<dyn ChatCompletions>) -> Result<Self> {
        job.validate()?;
        Ok(Self { job, client })
    }

    /// Run the whole job: batch requests until `num` variants are written.
    pub async fn run(&self, observer: &dyn ProgressObserver) -> Result<JobSummary> {
        let job = &self.job;

        let caption_src = tokio::fs::read_to_string(&job.caption).await?;
        let (caption_body, tags) = split_caption_and_tags(caption_src.trim());
        let caption_fingerprint = LanguageFingerprint::detect(&caption_body);
        let caption_dir = parent_dir(&job.caption);

        debug!(
            "caption fingerprint: {}; {} hashtag(s) preserved",
            caption_fingerprint,
            tags.len()
        );

        let mut tts_dir = None;
        let mut tts_source = None;
        if let Some(path) = job.tts_path() {
            let text = tokio::fs::read_to_string(path).await?.trim().to_string();
            let fingerprint = LanguageFingerprint::detect(&text);
            debug!("TTS fingerprint: {}", fingerprint);
            tts_dir = Some(parent_dir(path));
            tts_source = Some((text, fingerprint));
        }

        let prompts = PromptBuilder::new(caption_body, caption_fingerprint, tts_source);
        let params = SamplingParams {
            model: job.model.clone(),
            max_tokens: job.max_tokens,
            temperature: job.temperature,
        };
        let stream_opts = StreamOptions {
            enabled: job.stream,
            style: job.stream_style,
            show_reasoning: job.show_reasoning,
            transcript: job.stream_log.clone(),
        };

        let total = job.num;
        let per_request = job.per_request();

        let mut made = 0u32;
        let mut batch_index = 0u32;
        let mut global_index = 0u32;
        let mut batch_sizes = Vec::new();

        while made < total {
            // The last batch may be smaller than the configured size.
            let k = per_request.min(total - made);
            batch_index += 1;
            batch_sizes.push(k);

            observer.on_output_line(&format!(
                "batch {}: requesting {} variant(s), {}/{} written",
                batch_index, k, made, total
            ));

            let (system_prompt, user_prompt) = prompts.build(batch_index as usize - 1, k);
            let batch = self
                .request_batch(&system_prompt, &user_prompt, k, &params, &stream_opts, &tags, observer)
                .await?;

            for variant in batch {
                global_index += 1;
                self.write_variant(&variant, global_index, &caption_dir, tts_dir.as_deref(), observer)
                    .await?;
                made += 1;
            }
        }

        info!(
            "✅ Job complete: {} variants written in {} batches",
            made, batch_index
        );

        Ok(JobSummary {
            variants_written: made,
            batches: batch_index,
            batch_sizes,
        })
    }

    /// Run the job, forwarding progress lines to the callbacks; returns a
    /// process-style exit status for embedding in a UI or service layer.
    pub async fn run_with_callbacks<O, E>(&self, on_output: O, on_error: E) -> i32
    where
        O: Fn(&str) + Send + Sync,
        E: Fn(&str) + Send + Sync,
    {
        struct CallbackObserver<O, E> {
            out: O,
            err: E,
        }

        impl<O, E> ProgressObserver for CallbackObserver<O, E>
        where
            O: Fn(&str) + Send + Sync,
            E: Fn(&str) + Send + Sync,
        {
            fn on_output_line(&self, line: &str) {
                (self.out)(line)
            }

            fn on_error_line(&self, line: &str) {
                (self.err)(line)
            }
        }

        let observer = CallbackObserver {
            out: on_output,
            err: on_error,
        };

        match self.run(&observer).await {
            Ok(summary) => {
                observer.on_output_line(&format!(
                    "done: {} variants written in {} batches",
                    summary.variants_written, summary.batches
                ));
                0
            }
            Err(error) => {
                observer.on_error_line(&format!("rewrite job failed: {}", error));
                1
            }
        }
    }

    /// One batch: request and parse, retrying both stages against a shared
    /// per-batch budget. Exhausting it surfaces the last error with a raw
    /// response fragment for diagnostics.
    #[allow(clippy::too_many_arguments)]
    async fn request_batch(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        k: u32,
        params: &SamplingParams,
        stream_opts: &StreamOptions,
        tags: &[String],
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<Variant>> {
        let retries = self.job.retries;
        let mut raw = String::new();

        for attempt in 0..=retries {
            match self
                .attempt_batch(system_prompt, user_prompt, k, params, stream_opts, tags, &mut raw)
                .await
            {
                Ok(variants) => return Ok(variants),
                Err(error) => {
                    if attempt >= retries {
                        return Err(RewriteError::RetriesExhausted {
                            attempts: attempt + 1,
                            last_error: error.to_string(),
                            raw_fragment: truncate_chars(&raw, RAW_FRAGMENT_CHARS),
                        });
                    }

                    let delay = Duration::from_millis(BACKOFF_STEP_MS * (u64::from(attempt) + 1));
                    warn!(
                        "batch attempt {} failed: {}; retrying in {:.1}s",
                        attempt + 1,
                        error,
                        delay.as_secs_f64()
                    );
                    observer.on_error_line(&format!("attempt {} failed: {}", attempt + 1, error));
                    tokio::time::sleep(delay).await;
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_batch(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        k: u32,
        params: &SamplingParams,
        stream_opts: &StreamOptions,
        tags: &[String],
        raw_out: &mut String,
    ) -> Result<Vec<Variant>> {
        let raw =
            drive_completion(self.client.as_ref(), system_prompt, user_prompt, params, stream_opts)
                .await?;
        *raw_out = raw.clone();

        if raw.trim().is_empty() {
            return Err(RewriteError::EmptyResponse);
        }

        normalize_response(&raw, k, self.job.tts_mode(), tags)
    }

    async fn write_variant(
        &self,
        variant: &Variant,
        global_index: u32,
        caption_dir: &Path,
        tts_dir: Option<&Path>,
        observer: &dyn ProgressObserver,
    ) -> Result<()> {
        let index = format!("{:02}", global_index);

        if let Some(dir) = tts_dir {
            let path = dir.join(format!("variant_{}_tts.txt", index));
            tokio::fs::write(&path, variant.tts.as_deref().unwrap_or_default()).await?;
            observer.on_output_line(&format!("✓ TTS: {}", path.display()));
        }

        let path = caption_dir.join(format!("variant_{}_caption.txt", index));
        tokio::fs::write(&path, &variant.caption).await?;
        observer.on_output_line(&format!("✓ Caption: {}", path.display()));

        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
