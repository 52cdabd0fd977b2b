//! Batch analysis orchestrator.
//!
//! [`ImagesAnalyzer::analyze`] turns an ordered list of page images into one
//! document:
//!
//! ```text
//! Idle ──▶ Dispatching ──▶ Awaiting ──▶ Joining ──▶ Done
//!                             │
//!                             └──▶ Failed
//! ```
//!
//! * **Dispatching** encodes the images (bounded concurrency), splits them
//!   into batches and spawns one task per batch on a `JoinSet`, so every
//!   batch is in flight at once.
//! * **Awaiting** joins all tasks. The first failed batch fails the whole
//!   call; the remaining tasks are detached, not aborted, and whatever they
//!   produce is ignored.
//! * **Joining** restores batch order and joins texts with `"\n"`.
//! * **Done** writes the document to the sink and logs usage totals.
//!
//! The batch pool and the service handle belong to a [`ReleaseGuard`] whose
//! `Drop` runs exactly once per call, on every exit path.

use crate::config::MAX_ENCODE_CONCURRENCY;
use crate::error::{DocBatchError, StreamError};
use crate::output::{AnalysisOutput, AnalysisStats, BatchResult, BatchStats};
use crate::pipeline::batch::{self, Batch};
use crate::pipeline::encode::{self, Base64FileEncoder, Encoder};
use crate::pipeline::request;
use crate::pipeline::sink::{FileSink, ResultSink};
use crate::pipeline::stream;
use crate::progress::ProgressCallback;
use crate::service::{InferenceConnector, InferenceService};
use crate::usage::UsageAccumulator;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisState {
    Idle,
    Dispatching,
    Awaiting,
    Joining,
    Done,
    Failed,
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Awaiting => "awaiting",
            Self::Joining => "joining",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl AnalysisState {
    fn enter(&mut self, next: AnalysisState) {
        debug!("Analysis {} → {}", self, next);
        *self = next;
    }
}

/// What a batch task hands back to the orchestrator.
type BatchOutcome = (usize, Result<BatchResult, DocBatchError>);

/// Owns the batch pool and the service handle for one `analyze` call.
struct ReleaseGuard {
    tasks: JoinSet<BatchOutcome>,
    service: Arc<dyn InferenceService>,
    progress: Option<ProgressCallback>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let abandoned = self.tasks.len();
        if abandoned > 0 {
            warn!("Abandoning {} in-flight batch(es); their results are discarded", abandoned);
        }
        self.tasks.detach_all();

        if let Err(e) = self.service.shutdown() {
            let e = match e {
                e @ DocBatchError::ResourceCleanupFailure(_) => e,
                other => DocBatchError::ResourceCleanupFailure(other.to_string()),
            };
            warn!("{}", e);
        }

        if let Some(cb) = &self.progress {
            cb.on_resources_released();
        }
        debug!("Batch pool and {} service released", self.service.name());
    }
}

/// Coordinates encoding, batch dispatch and ordered reassembly.
///
/// One analyzer can serve many `analyze` calls; each call connects its own
/// service handle and releases it before returning.
pub struct ImagesAnalyzer {
    connector: Arc<dyn InferenceConnector>,
    encoder: Arc<dyn Encoder>,
    sink: Arc<dyn ResultSink>,
    progress: Option<ProgressCallback>,
    encode_concurrency: usize,
}

impl ImagesAnalyzer {
    /// Analyzer with the file encoder and file sink.
    pub fn new(connector: Arc<dyn InferenceConnector>) -> Self {
        Self {
            connector,
            encoder: Arc::new(Base64FileEncoder),
            sink: Arc::new(FileSink),
            progress: None,
            encode_concurrency: MAX_ENCODE_CONCURRENCY,
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Clamped to `1..=MAX_ENCODE_CONCURRENCY`.
    pub fn with_encode_concurrency(mut self, n: usize) -> Self {
        self.encode_concurrency = n.clamp(1, MAX_ENCODE_CONCURRENCY);
        self
    }

    /// Analyze `images` in batches of `batch_size` and write the joined text
    /// to `result_target`.
    ///
    /// An empty image list is not an error: no request is sent and an empty
    /// document is written.
    ///
    /// # Errors
    /// * [`DocBatchError::InvalidArgument`] for a zero batch size or a missing
    ///   credential, before any I/O.
    /// * [`DocBatchError::EncodingFailure`] if any image cannot be read.
    /// * [`DocBatchError::BatchFailed`] for the first batch that fails; the
    ///   sink is not written.
    /// * [`DocBatchError::OutputWriteFailed`] if the sink fails.
    pub async fn analyze(
        &self,
        images: &[PathBuf],
        result_target: &Path,
        model: &str,
        credential: Option<&str>,
        batch_size: usize,
    ) -> Result<AnalysisOutput, DocBatchError> {
        let start = Instant::now();
        let mut state = AnalysisState::Idle;

        if batch_size == 0 {
            return Err(DocBatchError::InvalidArgument(
                "batch size must be a positive integer".into(),
            ));
        }
        if model.trim().is_empty() {
            return Err(DocBatchError::InvalidArgument("model must not be empty".into()));
        }

        let service = self.connector.connect(credential)?;
        let mut guard = ReleaseGuard {
            tasks: JoinSet::new(),
            service: Arc::clone(&service),
            progress: self.progress.clone(),
        };

        state.enter(AnalysisState::Dispatching);
        info!(
            "Analyzing {} images with model {} (batch size {}, backend {})",
            images.len(),
            model,
            batch_size,
            service.name()
        );

        let encode_start = Instant::now();
        let encoded = encode::encode_all(self.encoder.as_ref(), images, self.encode_concurrency)
            .await
            .inspect_err(|_| state.enter(AnalysisState::Failed))?;
        let encode_duration_ms = encode_start.elapsed().as_millis() as u64;
        debug!("Encoded {} images in {}ms", encoded.len(), encode_duration_ms);

        let batches = batch::split(encoded, batch_size)?;
        let total = batches.len();
        let batch_images: Vec<usize> = batches.iter().map(Batch::len).collect();
        if let Some(cb) = &self.progress {
            cb.on_analysis_start(total, images.len());
        }

        let analysis_start = Instant::now();
        let usage = Arc::new(UsageAccumulator::new());
        let model: Arc<str> = Arc::from(model);
        for batch in batches {
            if let Some(cb) = &self.progress {
                cb.on_batch_start(batch.index(), total);
            }
            guard.tasks.spawn(run_batch(
                batch,
                Arc::clone(&model),
                Arc::clone(&service),
                Arc::clone(&usage),
            ));
        }

        state.enter(AnalysisState::Awaiting);
        let mut results: Vec<Option<BatchResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = guard.tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| {
                state.enter(AnalysisState::Failed);
                DocBatchError::Internal(format!("Batch task was cancelled: {e}"))
            })?;
            match outcome {
                Ok(result) => {
                    if let Some(cb) = &self.progress {
                        cb.on_batch_complete(index, total, result.text.len());
                    }
                    results[index] = Some(result);
                }
                Err(e) => {
                    state.enter(AnalysisState::Failed);
                    warn!("{}", e);
                    if let Some(cb) = &self.progress {
                        cb.on_batch_error(index, total, &e.to_string());
                    }
                    return Err(e);
                }
            }
        }
        let analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;

        state.enter(AnalysisState::Joining);
        let results: Vec<BatchResult> = results
            .into_iter()
            .enumerate()
            .map(|(index, r)| {
                r.ok_or_else(|| DocBatchError::Internal(format!("Batch {index} produced no result")))
            })
            .collect::<Result<_, _>>()?;
        let text = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        self.sink.write(result_target, &text).await?;
        let totals = usage.totals();
        info!("Usage totals: {}", totals.summary());
        if let Some(cb) = &self.progress {
            cb.on_analysis_complete(total);
        }
        state.enter(AnalysisState::Done);
        drop(guard);

        let batches = results
            .into_iter()
            .zip(batch_images)
            .map(|(r, images)| BatchStats {
                batch_index: r.batch_index,
                images,
                text_len: r.text.len(),
                usage: r.usage,
                request_id: r.request_id,
                duration_ms: r.duration_ms,
            })
            .collect();

        Ok(AnalysisOutput {
            text,
            result_path: result_target.to_path_buf(),
            model: model.to_string(),
            usage: totals,
            batches,
            stats: AnalysisStats {
                images: images.len(),
                batches: total,
                batch_size,
                encode_duration_ms,
                analysis_duration_ms,
                total_duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }
}

/// Body of one batch task: build the request, consume the stream, record usage.
async fn run_batch(
    batch: Batch,
    model: Arc<str>,
    service: Arc<dyn InferenceService>,
    usage: Arc<UsageAccumulator>,
) -> BatchOutcome {
    let index = batch.index();
    let start = Instant::now();

    let work = async {
        let request = request::build(&model, &batch);
        let result = stream::consume(&request, service.as_ref()).await?;
        usage.record(result.usage);
        Ok::<_, DocBatchError>(result)
    };

    let outcome = AssertUnwindSafe(work)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(DocBatchError::BatchFailed {
                batch_index: index,
                model: model.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
                cause: StreamError::TaskPanicked(panic_message(panic.as_ref())),
            })
        });

    (index, outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn state_names() {
        let mut state = AnalysisState::Idle;
        state.enter(AnalysisState::Dispatching);
        assert_eq!(state, AnalysisState::Dispatching);
        assert_eq!(AnalysisState::Failed.to_string(), "failed");
    }
}
