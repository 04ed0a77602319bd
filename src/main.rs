//! # Parafetch CLI
//!
//! Command-line interface for the parafetch library.
//! Provides a curl-like interface for parallel chunked downloads.

use std::time::Duration;

use clap::Parser;
use log::error;
use parafetch::{
    CancellationToken, ChunkPolicy, DownloadConfig, Downloader, Error, OverwriteBehavior, Result,
    DEFAULT_CHUNK_COUNT_HINT, DEFAULT_WRITE_BUFFER_SIZE,
};

mod cli;

const MIB: u64 = 1024 * 1024;

/// Command-line interface for parafetch
#[derive(Parser, Debug)]
#[command(name = "parafetch")]
#[command(about = "Parallel chunked HTTP(S) downloader")]
#[command(long_about = "Downloads a resource over several ranged connections at once:
  parafetch https://host/disk.iso                 # Save as disk.iso
  parafetch https://host/disk.iso out.iso         # Save as out.iso
  parafetch --fixed-chunks --chunks 8 URL         # Always split into 8 chunks
  parafetch --dry-run URL                         # Show the plan only

File Overwrite Behavior:
  By default, you'll be prompted if destination file exists
  --force                          # Overwrite without asking
  --no-clobber                     # Never overwrite, fail if file exists")]
#[command(version = env!("PARAFETCH_VERSION"))]
struct Cli {
    /// http(s) URL to download
    url: String,

    /// Output file path (defaults to the last URL path segment)
    #[arg(default_value = "")]
    output: String,

    /// Chunk count used with --fixed-chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_COUNT_HINT)]
    chunks: usize,

    /// Target chunk size in MiB; resources below it are fetched in one request
    #[arg(long, default_value_t = 100)]
    chunk_size_mib: u64,

    /// Split into exactly --chunks chunks regardless of size
    #[arg(long)]
    fixed_chunks: bool,

    /// Maximum number of concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Per-chunk write buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_WRITE_BUFFER_SIZE)]
    buffer_size: usize,

    /// Extra request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable dry-run mode (probe the size and show the plan without downloading)
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Force overwrite existing files without prompting
    #[arg(short, long)]
    force: bool,

    /// Never overwrite existing files (fail if destination exists)
    #[arg(long)]
    no_clobber: bool,

    /// Print events as JSON lines on stdout instead of a progress bar
    #[arg(long)]
    json: bool,
}

/// Resolve output file path from CLI arguments
fn resolve_output(url: &str, output: &str) -> String {
    if output.is_empty() {
        parafetch::resolve_output_filename(url)
    } else {
        output.to_string()
    }
}

/// Parse a `Name: value` header argument
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("Malformed header '{raw}' (expected \"Name: value\")")))
}

/// Determine overwrite behavior from CLI flags
fn overwrite_behavior(cli: &Cli) -> Result<OverwriteBehavior> {
    match (cli.force, cli.no_clobber) {
        (true, true) => Err(Error::InvalidInput(
            "--force and --no-clobber cannot be used together".to_string(),
        )),
        (true, false) => Ok(OverwriteBehavior::Force),
        (false, true) => Ok(OverwriteBehavior::NeverOverwrite),
        (false, false) => Ok(OverwriteBehavior::Prompt),
    }
}

fn build_config(cli: &Cli) -> Result<DownloadConfig> {
    let chunk_policy = if cli.fixed_chunks {
        ChunkPolicy::Fixed
    } else {
        let bytes = cli
            .chunk_size_mib
            .checked_mul(MIB)
            .ok_or_else(|| Error::InvalidInput(format!("Chunk size too large: {} MiB", cli.chunk_size_mib)))?;
        ChunkPolicy::PerChunkBytes(bytes)
    };

    let mut config = DownloadConfig::new(&cli.url, resolve_output(&cli.url, &cli.output))
        .with_chunk_count_hint(cli.chunks)
        .with_chunk_policy(chunk_policy)
        .with_write_buffer_size(cli.buffer_size)
        .with_overwrite(overwrite_behavior(cli)?);

    if let Some(limit) = cli.max_connections {
        config = config.with_max_concurrency(limit);
    }
    if let Some(seconds) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(seconds));
    }
    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        config = config.with_header(name, value)?;
    }

    Ok(config)
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e}");
        if e.is_remote() {
            eprintln!("💡 The server refused or broke the transfer; check the URL and whether it supports range requests");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut logger = env_logger::Builder::from_default_env();
    logger.target(env_logger::Target::Stderr);
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if cli.verbose {
        eprintln!("⚡ Parafetch v{} starting...", env!("PARAFETCH_VERSION"));
    }

    let config = build_config(&cli)?;
    let downloader = Downloader::new();

    if cli.dry_run {
        return show_plan(&downloader, &config, cli.json).await;
    }

    download_to_file(&downloader, &config, cli.json).await
}

/// Probe the size and print what a download would do
async fn show_plan(downloader: &Downloader, config: &DownloadConfig, json: bool) -> Result<()> {
    let plan = downloader.plan(config).await?;

    if json {
        let line = serde_json::to_string(&plan)
            .map_err(|e| Error::InvalidInput(format!("Could not serialize plan: {e}")))?;
        println!("{line}");
        return Ok(());
    }

    eprintln!("🔍 [DRY RUN] Would download: {} to {}", config.url, config.output_path.display());
    match plan.size.bytes() {
        Some(size) => eprintln!("📏 Size: {size} bytes"),
        None => eprintln!("📏 Size: unknown"),
    }
    if plan.is_parallel() {
        eprintln!("🧩 {} chunks:", plan.chunk_count);
        for range in &plan.ranges {
            eprintln!("   bytes={}-{} ({} bytes)", range.start, range.end, range.len());
        }
    } else {
        eprintln!("🧩 Single request for the whole resource");
    }
    Ok(())
}

/// Download to a file with progress bar
async fn download_to_file(downloader: &Downloader, config: &DownloadConfig, json: bool) -> Result<()> {
    if json {
        cli::attach_json_lines(downloader.events());
    } else {
        eprintln!("📁 Saving to: {}", config.output_path.display());
        let progress_manager = cli::ProgressManager::new(&format!("🌐 Downloading {}", config.url));
        progress_manager.attach(downloader.events());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let summary = downloader.download_with_cancel(config, cancel).await?;

    if !json {
        eprintln!(
            "✅ Wrote {} bytes in {} chunk(s)",
            summary.bytes_written, summary.chunk_count
        );
    }
    Ok(())
}
