//! # docbatch
//!
//! Extract the text of a PDF with a vision-language model, a batch of pages
//! per request.
//!
//! Every page is rendered to a JPEG, the images are grouped into fixed-size
//! batches, and each batch goes out as one streaming chat request. All
//! batches run concurrently; the streamed answers are folded back into text,
//! reordered by batch and joined with newlines into one document written next
//! to the PDF as `<stem>.md`. Token usage is summed across batches.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate the .pdf path, derive <stem>.md
//!  ├─ 2. Render   pages → <stem>/image-{n}.jpg via pdfium (spawn_blocking)
//!  ├─ 3. Encode   base64, at most 20 files in flight
//!  ├─ 4. Batch    contiguous groups of `batch_size` images
//!  ├─ 5. Analyze  one streaming request per batch, all concurrent
//!  └─ 6. Join     batch order, "\n" separator, write the document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docbatch::{convert, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from VOLC_APIKEY
//!     let config = AnalysisConfig::builder()
//!         .model("doubao-seed-1.6-vision")
//!         .batch_size(5)
//!         .build()?;
//!     let output = convert("document.pdf", &config).await?;
//!     eprintln!("{} → {}", output.usage.summary(), output.result_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! docbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::ImagesAnalyzer;
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use convert::{convert, convert_sync, convert_with};
pub use error::{DocBatchError, StreamError};
pub use output::{AnalysisOutput, AnalysisStats, BatchResult, BatchStats, UsageRecord, UsageTotals};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use usage::UsageAccumulator;
