//! CLI binary for scribe-vision.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, discovers screenshots missing a complete analysis, and
//! prints per-item progress plus a final summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scribe_vision::{
    analyze_batch, record_path, AnalysisConfig, AnalysisRequest, BatchProgressCallback,
    ExistingMetadata, ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// screenshot. Items complete out-of-order under the worker pool, so per-item
/// timing is keyed by index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} shots  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analyzing {total_items} screenshots…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, path: &Path) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(short_name(path));
    }

    fn on_item_complete(&self, index: usize, _total: usize, path: &Path) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            short_name(path),
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, _total: usize, path: &Path, error: &str) {
        let msg = if error.len() > 80 {
            let cut = error
                .char_indices()
                .take_while(|(i, _)| *i < 79)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(error.len());
            format!("{}\u{2026}", &error[..cut])
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            short_name(path),
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success: usize) {
        let failed = total.saturating_sub(success);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} screenshots analyzed successfully",
                green("✔"),
                bold(&success.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} screenshots analyzed  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a single screenshot (writes shot.json next to it)
  scribe-vision shot.png

  # Scan a capture folder and analyze everything still unprocessed
  scribe-vision --folder ~/Screenshots

  # Re-run with a bigger model and more workers
  scribe-vision --folder ~/Screenshots --model qwen2.5vl:7b --concurrency 4

  # Non-interactive (cron / launchd)
  scribe-vision --folder ~/Screenshots --yes --no-progress

  # Skip the local OCR pass
  scribe-vision shot.png --no-ocr

WHAT COUNTS AS UNPROCESSED:
  A screenshot is analyzed when its sibling .json is missing, unreadable, or
  lacks any of: detailed_analysis, overall_activity_score, category. Records
  with all three are considered complete and skipped.

ENVIRONMENT VARIABLES:
  OLLAMA_MODEL       Override the vision model (same as --model)
  SCRIBE_FOLDER      Default capture folder (same as --folder)
  SCRIBE_*           Capture-shell session snapshot (active app, battery,
                     network, timestamps, location) folded into each record

SETUP:
  1. Install Ollama and pull a vision model:   ollama pull qwen3-vl:2b
  2. Optional, better text extraction:         install tesseract
  3. Analyze:                                  scribe-vision --folder ~/Screenshots
"#;

/// Analyze desktop screenshots into structured activity records.
#[derive(Parser, Debug)]
#[command(
    name = "scribe-vision",
    version,
    about = "Analyze desktop screenshots into structured activity records using a local VLM",
    long_about = "Send desktop screenshots (plus a locally OCR'd text layer) to a local \
Ollama-compatible vision model and persist a validated activity record next to each image. \
Already-analyzed screenshots are skipped; incomplete or corrupt records are redone.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Screenshot file to analyze. Omit when using --folder.
    input: Option<PathBuf>,

    /// Capture folder to scan for unprocessed screenshots.
    #[arg(short, long, env = "SCRIBE_FOLDER")]
    folder: Option<PathBuf>,

    /// Vision model on the inference server.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "qwen3-vl:2b")]
    model: String,

    /// Inference server host.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Inference server port.
    #[arg(long, default_value_t = 11434)]
    port: u16,

    /// Number of screenshots analyzed concurrently.
    #[arg(short, long, default_value_t = 2)]
    concurrency: usize,

    /// Extra attempts per screenshot after the first failure.
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Per-inference-call timeout in seconds.
    #[arg(long, default_value_t = 90)]
    request_timeout: u64,

    /// Skip the local OCR pass.
    #[arg(long)]
    no_ocr: bool,

    /// Skip the confirmation prompt before a folder batch.
    #[arg(short, long)]
    yes: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Extensions the capture shell produces.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must land in the environment before clap resolves its `env`
    // fallbacks and before the session snapshot reads SCRIBE_* variables.
    load_dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user-facing feedback channel; library INFO
    // logs would just fight it for the terminal.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collect work ─────────────────────────────────────────────────────
    let requests = match (&cli.input, &cli.folder) {
        (Some(input), _) => {
            let mut request = AnalysisRequest::new(input.clone());
            if let Some(existing) = scribe_vision::load_existing_metadata(input).await {
                request = request.with_existing(existing);
            }
            vec![request]
        }
        (None, Some(folder)) => discover_unprocessed(folder)
            .await
            .with_context(|| format!("Failed to scan folder {}", folder.display()))?,
        (None, None) => {
            anyhow::bail!("Provide a screenshot path or --folder to scan");
        }
    };

    if requests.is_empty() {
        if !cli.quiet {
            eprintln!("{} Nothing to analyze — all screenshots are up to date", green("✔"));
        }
        return Ok(());
    }

    // ── Confirm folder batches ───────────────────────────────────────────
    if cli.folder.is_some() && cli.input.is_none() && !cli.yes {
        eprint!(
            "{} Analyze {} screenshots with {}? [y/N] ",
            cyan("?"),
            bold(&requests.len().to_string()),
            bold(&cli.model),
        );
        io::stderr().flush().ok();
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).ok();
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Cancelling — letting in-flight items finish…", cyan("⚠"));
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(requests.len());
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let mut builder = AnalysisConfig::builder()
        .model(cli.model.clone())
        .host(cli.host.clone())
        .port(cli.port)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .request_timeout_secs(cli.request_timeout)
        .ocr_enabled(!cli.no_ocr)
        .cancel_flag(cancel);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = analyze_batch(requests, &config)
        .await
        .context("Analysis failed")?;

    if !cli.quiet && !show_progress {
        eprintln!(
            "Analyzed {}/{} screenshots",
            result.success,
            result.total()
        );
    }
    if !cli.quiet && !result.errors.is_empty() {
        eprintln!("{}", bold("Failed:"));
        for failure in &result.errors {
            eprintln!(
                "  {} {}  {}",
                red("✗"),
                failure.path.display(),
                dim(&failure.error.to_string())
            );
        }
    }

    if result.failed > 0 && result.success == 0 {
        anyhow::bail!("all {} screenshots failed", result.failed);
    }
    Ok(())
}

/// Load `KEY=VALUE` pairs from a `.env` file in the working directory into
/// the process environment. Missing file is fine; the capture shell writes
/// one next to where it launches the analyzer.
fn load_dotenv() {
    if let Ok(contents) = std::fs::read_to_string(".env") {
        for (key, value) in parse_dotenv(&contents) {
            std::env::set_var(key, value);
        }
    }
}

/// Parse dotenv lines: blank lines and `#` comments are skipped, the first
/// `=` splits key from value, and one layer of surrounding quotes is
/// stripped from the value.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2 {
            let quoted = (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''));
            if quoted {
                value = &value[1..value.len() - 1];
            }
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

/// Scan a capture folder for screenshots whose sibling record is missing or
/// incomplete, carrying over metadata from records being redone. Capture
/// folders are organized into dated subfolders, so the scan descends into
/// every subdirectory.
async fn discover_unprocessed(folder: &Path) -> Result<Vec<AnalysisRequest>> {
    let mut pending_dirs = vec![folder.to_path_buf()];
    let mut requests = Vec::new();

    while let Some(dir) = pending_dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Folder is not readable: {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending_dirs.push(path);
                continue;
            }

            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if !is_image {
                continue;
            }

            match read_record(&record_path(&path)).await {
                Some(record) if record_is_complete(&record) => continue,
                Some(record) => {
                    let existing = ExistingMetadata::from_record_value(&record);
                    let mut request = AnalysisRequest::new(path);
                    if !existing.is_empty() {
                        request = request.with_existing(existing);
                    }
                    requests.push(request);
                }
                None => requests.push(AnalysisRequest::new(path)),
            }
        }
    }

    // Deterministic order regardless of directory iteration order.
    requests.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    Ok(requests)
}

async fn read_record(path: &Path) -> Option<serde_json::Value> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// A record counts as complete when the three load-bearing analysis fields
/// are present and non-empty.
fn record_is_complete(record: &serde_json::Value) -> bool {
    let has_text = |key: &str| {
        record
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    };
    has_text("detailed_analysis")
        && has_text("category")
        && record
            .get("overall_activity_score")
            .map(serde_json::Value::is_number)
            .unwrap_or(false)
}
