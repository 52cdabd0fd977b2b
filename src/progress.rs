//! Progress-callback trait for per-batch analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] (or
//! [`crate::analyze::ImagesAnalyzer::with_progress`]) to receive events as
//! batches are dispatched and completed.
//!
//! Batches run concurrently, so `on_batch_*` methods may be called from
//! several tasks at once. The trait is `Send + Sync`; implementations must
//! guard shared mutable state themselves.
//!
//! # Example
//!
//! ```rust
//! use docbatch::AnalysisProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch_index: usize, total_batches: usize, text_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("batch {batch_index} done ({done}/{total_batches}, {text_len} bytes)");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once, after batching and before any request is sent.
    fn on_analysis_start(&self, total_batches: usize, total_images: usize) {
        let _ = (total_batches, total_images);
    }

    /// Called when a batch is dispatched, just before its task is spawned.
    fn on_batch_start(&self, batch_index: usize, total_batches: usize) {
        let _ = (batch_index, total_batches);
    }

    /// Called when a batch stream completed with a usage report.
    fn on_batch_complete(&self, batch_index: usize, total_batches: usize, text_len: usize) {
        let _ = (batch_index, total_batches, text_len);
    }

    /// Called when a batch failed. The run will be abandoned.
    fn on_batch_error(&self, batch_index: usize, total_batches: usize, error: &str) {
        let _ = (batch_index, total_batches, error);
    }

    /// Called once when every batch succeeded and the document was joined.
    fn on_analysis_complete(&self, total_batches: usize) {
        let _ = total_batches;
    }

    /// Called exactly once per analysis, on success and failure alike, after
    /// the batch pool and the service handle were released.
    fn on_resources_released(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
