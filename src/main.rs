use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing::info;

use caption_rewriter::{RewriteJob, Rewriter, StdioObserver, StreamStyle};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Caption Rewriter")
        .version("0.1.0")
        .about("Rewrite short-video captions and TTS scripts via an OpenAI-compatible LLM")
        .arg(
            Arg::new("caption")
                .long("caption")
                .value_name("FILE")
                .help("Caption file path (required)")
                .required(true),
        )
        .arg(
            Arg::new("tts")
                .long("tts")
                .value_name("FILE")
                .help("TTS script file path (omit for caption-only mode)"),
        )
        .arg(
            Arg::new("num")
                .short('n')
                .long("num")
                .value_name("COUNT")
                .help("Total variants to generate")
                .default_value("3"),
        )
        .arg(
            Arg::new("variants-per-request")
                .long("variants-per-request")
                .value_name("COUNT")
                .help("How many variants to request per API call")
                .default_value("1"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("NAME")
                .help("Model identifier")
                .default_value("deepseek-chat"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Base URL of the OpenAI-compatible endpoint")
                .default_value("https://api.deepseek.com"),
        )
        .arg(
            Arg::new("temperature")
                .long("temperature")
                .value_name("FLOAT")
                .help("Sampling temperature")
                .default_value("0.8"),
        )
        .arg(
            Arg::new("max-tokens")
                .long("max-tokens")
                .value_name("COUNT")
                .help("Completion token budget per request")
                .default_value("3072"),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("COUNT")
                .help("Retries per batch on transient or malformed responses")
                .default_value("2"),
        )
        .arg(
            Arg::new("stream")
                .long("stream")
                .help("Stream partial output while requests are in flight")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-reasoning")
                .long("no-reasoning")
                .help("Hide intermediate reasoning output (reasoning models)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stream-style")
                .long("stream-style")
                .value_name("STYLE")
                .help("Streamed output display style: compact or raw")
                .default_value("compact"),
        )
        .arg(
            Arg::new("stream-log")
                .long("stream-log")
                .value_name("FILE")
                .help("Optional file that receives the full stream transcript"),
        )
        .arg(
            Arg::new("no-tts")
                .long("no-tts")
                .help("Caption-only mode: skip TTS output even when --tts is given")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .value_name("KEY")
                .help("API key override (default: DEEPSEEK_API_KEY environment variable)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let filter = if matches.get_flag("verbose") {
        "caption_rewriter=debug,info"
    } else {
        "caption_rewriter=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let stream_style: StreamStyle = matches
        .get_one::<String>("stream-style")
        .unwrap()
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let mut job = RewriteJob::new(matches.get_one::<String>("caption").unwrap());
    job.tts = matches.get_one::<String>("tts").map(PathBuf::from);
    job.num = matches.get_one::<String>("num").unwrap().parse()?;
    job.variants_per_request = matches
        .get_one::<String>("variants-per-request")
        .unwrap()
        .parse()?;
    job.model = matches.get_one::<String>("model").unwrap().clone();
    job.base_url = matches.get_one::<String>("base-url").unwrap().clone();
    job.temperature = matches.get_one::<String>("temperature").unwrap().parse()?;
    job.max_tokens = matches.get_one::<String>("max-tokens").unwrap().parse()?;
    job.retries = matches.get_one::<String>("retries").unwrap().parse()?;
    job.stream = matches.get_flag("stream");
    job.stream_style = stream_style;
    job.show_reasoning = !matches.get_flag("no-reasoning");
    job.stream_log = matches.get_one::<String>("stream-log").map(PathBuf::from);
    job.api_key = matches.get_one::<String>("api-key").cloned();
    job.caption_only = matches.get_flag("no-tts");

    info!("✍️  Caption rewriter starting...");
    info!("📄 Caption source: {}", job.caption.display());
    if let Some(tts) = job.tts_path() {
        info!("🔊 TTS source: {}", tts.display());
    }
    info!(
        "🎯 Variants requested: {} ({} per request, model {})",
        job.num,
        job.per_request(),
        job.model
    );

    let rewriter = Rewriter::new(job)?;

    let start_time = std::time::Instant::now();
    let summary = rewriter.run(&StdioObserver).await?;
    let duration = start_time.elapsed();

    info!(
        "🎉 Wrote {} variants in {} batches ({:.2}s)",
        summary.variants_written,
        summary.batches,
        duration.as_secs_f64()
    );

    Ok(())
}
