//! Result types produced by an analysis run.
//!
//! Everything here derives `Serialize` so the CLI can emit a machine-readable
//! summary with `--json`; the extracted text itself is the document written
//! to the result sink.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Token accounting reported once per completed inference call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecord {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Running sums of token usage across all batches of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Number of usage records folded into the totals.
    pub records: usize,
}

impl UsageTotals {
    /// Human-readable summary, logged once at the end of a run.
    pub fn summary(&self) -> String {
        format!(
            "prompt tokens {}; completion tokens {}; total tokens {}",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )
    }
}

/// Output of one batch: produced exactly once, folded into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 0-based ordinal of the batch among all batches.
    pub batch_index: usize,
    /// Concatenated text deltas, in arrival order.
    pub text: String,
    pub usage: UsageRecord,
    /// Request id announced at stream end, if the backend sent one.
    pub request_id: Option<String>,
    /// Wall-clock time spent consuming the stream.
    pub duration_ms: u64,
}

/// Per-batch line in the run summary (text omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub batch_index: usize,
    pub images: usize,
    pub text_len: usize,
    pub usage: UsageRecord,
    pub request_id: Option<String>,
    pub duration_ms: u64,
}

/// Timings and counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub images: usize,
    pub batches: usize,
    pub batch_size: usize,
    pub encode_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an [`crate::analyze::ImagesAnalyzer::analyze`] call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// The final document: batch texts joined by `\n` in batch order.
    pub text: String,
    /// Where the sink wrote the document.
    pub result_path: PathBuf,
    pub model: String,
    pub usage: UsageTotals,
    pub batches: Vec<BatchStats>,
    pub stats: AnalysisStats,
}

/// Format a duration as `{m}m {s}s` for the execution-time log line.
pub fn format_execution_time(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    format!("{}m {}s", total_secs / 60, total_secs % 60)
}
