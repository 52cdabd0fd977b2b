//! Stream consumption: drive one streaming call and fold it into a
//! [`BatchResult`].
//!
//! Text deltas are appended in arrival order. Exactly one usage report is
//! expected per call; zero or several are treated as a protocol violation
//! rather than silently reported as zero or first-wins.

use crate::error::{DocBatchError, StreamError};
use crate::output::{BatchResult, UsageRecord};
use crate::pipeline::request::AnalysisRequest;
use crate::service::{InferenceService, StreamChunk};
use futures::StreamExt;
use std::time::Instant;
use tracing::{debug, info};

/// Consume the stream for `request` to completion.
///
/// Safe to run concurrently with other calls sharing `service`.
///
/// # Errors
/// Any transport or decoding failure, and any usage-report count other than
/// one, is returned as [`DocBatchError::BatchFailed`] for this batch.
pub async fn consume(
    request: &AnalysisRequest,
    service: &dyn InferenceService,
) -> Result<BatchResult, DocBatchError> {
    let start = Instant::now();
    let fail = |cause: StreamError| DocBatchError::BatchFailed {
        batch_index: request.batch_index,
        model: request.model.clone(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        cause,
    };

    let mut stream = service.stream_chat(request).await.map_err(fail)?;

    let mut text = String::new();
    let mut usage: Option<UsageRecord> = None;
    let mut usage_reports = 0usize;
    let mut request_id: Option<String> = None;

    while let Some(chunk) = stream.next().await {
        match chunk.map_err(fail)? {
            StreamChunk::TextDelta(delta) => text.push_str(&delta),
            StreamChunk::UsageReport(record) => {
                usage_reports += 1;
                usage.get_or_insert(record);
            }
            StreamChunk::StreamEnd { request_id: id } => {
                debug!("Batch {}: request id {}", request.batch_index, id);
                request_id = Some(id);
            }
        }
    }

    let usage = match (usage, usage_reports) {
        (Some(record), 1) => record,
        (None, _) => return Err(fail(StreamError::MissingUsageReport)),
        (Some(_), count) => return Err(fail(StreamError::UnexpectedUsageReports { count })),
    };

    let duration = start.elapsed();
    info!(
        "Batch {} usage: prompt tokens {}; completion tokens {}; total tokens {} ({:.1}s)",
        request.batch_index,
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens,
        duration.as_secs_f64()
    );

    Ok(BatchResult {
        batch_index: request.batch_index,
        text,
        usage,
        request_id,
        duration_ms: duration.as_millis() as u64,
    })
}
