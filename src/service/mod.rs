//! Inference backends: the capability to open one streaming chat call.
//!
//! The orchestrator only sees two traits:
//!
//! * [`InferenceConnector`]: turns a credential into a service handle. One
//!   handle is created per analysis and released when the analysis ends.
//! * [`InferenceService`]: opens a stream of [`StreamChunk`]s for one
//!   request. Handles are shared by all batch tasks of a run, so
//!   implementations must be safe for concurrent use.
//!
//! Two backends ship with the crate:
//!
//! * [`ark`]: OpenAI-compatible streaming chat completions over HTTP with
//!   server-sent events, decoded by [`sse`]
//! * [`provider`]: any `edgequake-llm` provider, replayed as a stream

pub mod ark;
pub mod provider;
pub mod sse;

use crate::error::{DocBatchError, StreamError};
use crate::output::UsageRecord;
use crate::pipeline::request::AnalysisRequest;
use futures::future::BoxFuture;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// One incremental unit of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A piece of generated text.
    TextDelta(String),
    /// Token accounting for the whole call.
    UsageReport(UsageRecord),
    /// The model finished; carries the backend's request id.
    StreamEnd { request_id: String },
}

/// A boxed stream of chunks for one call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, StreamError>> + Send>>;

/// A handle able to open streaming chat calls.
pub trait InferenceService: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Open one streaming call for `request`.
    ///
    /// Resolves once the call is established; chunks then arrive through
    /// the returned stream.
    fn stream_chat<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<ChunkStream, StreamError>>;

    /// Release the handle's connection resources.
    ///
    /// Calls already in flight keep whatever they hold and finish on their
    /// own; calls opened afterwards fail with [`StreamError::ServiceClosed`].
    fn shutdown(&self) -> Result<(), DocBatchError>;
}

/// Creates a service handle for one analysis.
pub trait InferenceConnector: Send + Sync {
    fn connect(&self, credential: Option<&str>) -> Result<Arc<dyn InferenceService>, DocBatchError>;
}
