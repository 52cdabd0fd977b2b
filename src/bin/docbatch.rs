//! CLI binary for docbatch.
//!
//! A thin shim over the library crate that maps CLI arguments to
//! `AnalysisConfig`, runs the conversion and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use docbatch::config::{API_KEY_ENV, DEFAULT_BASE_URL};
use docbatch::output::format_execution_time;
use docbatch::{
    convert, AnalysisConfig, AnalysisOutput, AnalysisProgressCallback, DocBatchError,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::error;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar over batches. Batches finish out of order, so each
/// keeps its own start time.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analyzing");
    }

    fn elapsed_secs(&self, batch_index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&batch_index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_batches: usize, total_images: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Analyzing {total_images} pages in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch_index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(batch_index, Instant::now());
    }

    fn on_batch_complete(&self, batch_index: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(batch_index);
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            batch_index + 1,
            total,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch_index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(batch_index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch_index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_analysis_complete(&self, total_batches: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} batches analyzed",
            green("✔"),
            bold(&total_batches.to_string())
        );
    }

    fn on_resources_released(&self) {
        if self.errors.load(Ordering::SeqCst) > 0 {
            self.bar.abandon();
        }
    }
}

/// Stderr writer that hides the progress bar while a log line is printed.
struct BarWriter(Option<ProgressBar>);

impl Write for BarWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Tracing filter used when `RUST_LOG` is not set.
fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Five pages per request, key from VOLC_APIKEY
  docbatch doubao-seed-1.6-vision report.pdf 5

  # Explicit key, one page per request
  docbatch doubao-1.5-vision-pro report.pdf 1 "$KEY"

  # Another provider through edgequake-llm
  docbatch --provider openai gpt-4.1-mini report.pdf 4

  # Machine-readable summary
  docbatch --json doubao-seed-1.6-vision report.pdf 5 > summary.json

OUTPUT:
  Page images are written to <dir>/<stem>/image-{n}.jpg and the extracted
  text to <dir>/<stem>.md, next to the input document.

ENVIRONMENT VARIABLES:
  VOLC_APIKEY        Ark API key (used when no key argument is given)
  DOCBATCH_BASE_URL  Override the Ark endpoint
  PDFIUM_LIB_PATH    Path to an existing libpdfium (file or directory)
  RUST_LOG           Tracing filter, overrides --verbose/--quiet
"#;

/// Analyze a PDF with a vision-language model, several pages per request.
#[derive(Parser, Debug)]
#[command(
    name = "docbatch",
    version,
    about = "Extract the text of a PDF with a vision-language model, in concurrent page batches",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Model ID (e.g. doubao-seed-1.6-vision).
    model: String,

    /// Path to the PDF document.
    pdf: PathBuf,

    /// Pages per request (positive integer).
    #[arg(allow_negative_numbers = true)]
    batch_size: i64,

    /// API key; falls back to VOLC_APIKEY.
    #[arg(env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Ark endpoint base URL.
    #[arg(long, env = "DOCBATCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, ...) instead of Ark.
    #[arg(long, env = "DOCBATCH_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "DOCBATCH_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Whole-request timeout per batch, in seconds.
    #[arg(long, env = "DOCBATCH_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Print a JSON summary (AnalysisOutput) on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    if cli.batch_size <= 0 {
        return Err(DocBatchError::InvalidArgument(format!(
            "batch size must be a positive integer, got {}",
            cli.batch_size
        )))
        .context("Invalid arguments");
    }
    let batch_size =
        usize::try_from(cli.batch_size).context("batch size does not fit this platform")?;

    let mut builder = AnalysisConfig::builder()
        .model(&cli.model)
        .batch_size(batch_size)
        .base_url(&cli.base_url)
        .dpi(cli.dpi)
        .request_timeout_secs(cli.timeout);
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid arguments")
}

fn print_summary(output: &AnalysisOutput) {
    eprintln!(
        "{}  {} pages  {} batches  {}  →  {}",
        green("✔"),
        output.stats.images,
        output.stats.batches,
        format_execution_time(output.stats.total_duration_ms),
        bold(&output.result_path.display().to_string()),
    );
    eprintln!("   {}", dim(&output.usage.summary()));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = default_filter(cli.verbose, cli.quiet);

    let cli_progress = show_progress.then(CliProgressCallback::new_dynamic);
    let bar = cli_progress.as_ref().map(|cb| cb.bar.clone());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(move || BarWriter(bar.clone()))
        .init();

    let progress_cb: Option<ProgressCallback> =
        cli_progress.map(|cb| cb as Arc<dyn AnalysisProgressCallback>);

    let config = build_config(&cli, progress_cb)?;

    let output = match convert(&cli.pdf, &config).await {
        Ok(output) => output,
        Err(DocBatchError::SourceUnavailable { path }) => {
            error!("Document not found: {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).context("Analysis failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(true, false), "debug");
        assert_eq!(default_filter(false, true), "error");
    }

    #[test]
    fn non_positive_batch_size_is_rejected() {
        let cli = Cli::parse_from(["docbatch", "m", "doc.pdf", "0"]);
        assert!(build_config(&cli, None).is_err());

        let cli = Cli::parse_from(["docbatch", "m", "doc.pdf", "-3"]);
        assert!(build_config(&cli, None).is_err());
    }
}
