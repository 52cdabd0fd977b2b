//! Error types for the docbatch library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`DocBatchError`]: **Fatal**: the run cannot produce a document
//!   (bad argument, missing file, unreadable image, one batch failed).
//!   Returned as `Err(DocBatchError)` from every public entry point.
//!
//! * [`StreamError`]: **Batch-scoped**: why a single streaming call went
//!   wrong (transport reset, malformed chunk, missing usage report). It never
//!   travels alone; the orchestrator wraps it in
//!   [`DocBatchError::BatchFailed`] together with the batch index, the model
//!   and the elapsed time so a single log line is enough to act on it.
//!
//! A document is either fully extracted or not returned at all, so a
//! batch-scoped error always escalates to a fatal one.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docbatch library.
#[derive(Debug, Error)]
pub enum DocBatchError {
    // ── Argument errors ───────────────────────────────────────────────────
    /// A caller-supplied argument is unusable (batch size, extension, key).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The document to analyse does not exist.
    #[error("Source document not found: '{path}'")]
    SourceUnavailable { path: PathBuf },

    /// One page image could not be read or encoded.
    #[error("Failed to encode image '{path}': {source}")]
    EncodingFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium failed to render or save a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Inference errors ──────────────────────────────────────────────────
    /// The inference backend could not be constructed.
    #[error("Inference backend '{backend}' is not available.\n{hint}")]
    ServiceUnavailable { backend: String, hint: String },

    /// One batch's streaming call failed; the whole analysis is abandoned.
    #[error("Batch {batch_index} failed on model '{model}' after {elapsed_ms}ms: {cause}")]
    BatchFailed {
        batch_index: usize,
        model: String,
        elapsed_ms: u64,
        #[source]
        cause: StreamError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the result file.
    #[error("Failed to write result file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Releasing a pool or service handle failed. Logged, never returned
    /// in place of the primary outcome.
    #[error("Resource cleanup failed: {0}")]
    ResourceCleanupFailure(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocBatchError {
    /// Batch index carried by a [`DocBatchError::BatchFailed`], if any.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            DocBatchError::BatchFailed { batch_index, .. } => Some(*batch_index),
            _ => None,
        }
    }
}

/// Why one streaming inference call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Connection reset, DNS failure, body read error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint reported an error inside the stream.
    #[error("remote error: {0}")]
    Remote(String),

    /// A chunk could not be decoded.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// The stream finished without a usage report.
    #[error("stream ended without a usage report")]
    MissingUsageReport,

    /// The stream carried more than one usage report.
    #[error("expected exactly one usage report, got {count}")]
    UnexpectedUsageReports { count: usize },

    /// The service handle was already shut down.
    #[error("inference service is shut down")]
    ServiceClosed,

    /// The batch task panicked.
    #[error("batch task panicked: {0}")]
    TaskPanicked(String),
}
