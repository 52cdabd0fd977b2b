//! Adapter that lets any `edgequake-llm` provider serve as the inference
//! backend.
//!
//! Providers expose a non-streaming `chat` call, so each batch is sent as a
//! single request and the response is replayed as a three-chunk stream:
//! text, usage, end. Provider API keys are read by `ProviderFactory` from the
//! provider's own environment variables (`OPENAI_API_KEY`, ...); the
//! credential passed to [`InferenceConnector::connect`] is not used.
//!
//! Temperature, top_p and the token ceiling are forwarded. Providers have no
//! reasoning switch in their completion options, so `thinking` is dropped.

use crate::error::{DocBatchError, StreamError};
use crate::output::UsageRecord;
use crate::pipeline::request::{AnalysisRequest, ChatMessage, ContentPart};
use crate::service::{ChunkStream, InferenceConnector, InferenceService, StreamChunk};
use edgequake_llm::{CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::stream;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Split `data:<mime>;base64,<data>` into `(mime, data)`.
pub fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    Some((mime, data))
}

fn to_provider_messages(request: &AnalysisRequest) -> Vec<edgequake_llm::ChatMessage> {
    request
        .messages
        .iter()
        .map(|message| match message {
            ChatMessage::System { content } => edgequake_llm::ChatMessage::system(content.as_str()),
            ChatMessage::User { content } => {
                let mut text = String::new();
                let mut images = Vec::new();
                for part in content {
                    match part {
                        ContentPart::Text { text: t } => text.push_str(t),
                        ContentPart::ImageUrl { image_url } => {
                            if let Some((mime, data)) = split_data_uri(&image_url.url) {
                                images.push(ImageData::new(data.to_string(), mime));
                            }
                        }
                    }
                }
                edgequake_llm::ChatMessage::user_with_images(text.as_str(), images)
            }
        })
        .collect()
}

/// Decoding options for one batch request.
pub(crate) fn provider_options(request: &AnalysisRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        top_p: Some(request.top_p),
        max_tokens: Some(request.max_tokens as usize),
        ..Default::default()
    }
}

/// One provider handle, shared by all batch tasks of a run.
pub struct ProviderService {
    name: String,
    provider: Mutex<Option<Arc<dyn LLMProvider>>>,
}

impl ProviderService {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider: Mutex::new(Some(provider)),
        }
    }

    fn provider(&self) -> Result<Arc<dyn LLMProvider>, StreamError> {
        self.provider
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(StreamError::ServiceClosed)
    }
}

impl InferenceService for ProviderService {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream_chat<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<ChunkStream, StreamError>> {
        Box::pin(async move {
            let provider = self.provider()?;
            let messages = to_provider_messages(request);
            let options = provider_options(request);

            let response = provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| StreamError::Remote(e.to_string()))?;

            let usage = UsageRecord::new(
                response.prompt_tokens as u64,
                response.completion_tokens as u64,
                response.total_tokens as u64,
            );
            debug!(
                "Batch {}: {} replied with {} bytes",
                request.batch_index,
                self.name,
                response.content.len()
            );

            let mut chunks = Vec::with_capacity(3);
            if !response.content.is_empty() {
                chunks.push(Ok(StreamChunk::TextDelta(response.content)));
            }
            chunks.push(Ok(StreamChunk::UsageReport(usage)));
            chunks.push(Ok(StreamChunk::StreamEnd {
                request_id: String::new(),
            }));
            let stream: ChunkStream = Box::pin(stream::iter(chunks));
            Ok(stream)
        })
    }

    fn shutdown(&self) -> Result<(), DocBatchError> {
        let released = self
            .provider
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match released {
            Some(_) => Ok(()),
            None => Err(DocBatchError::ResourceCleanupFailure(format!(
                "provider '{}' was already shut down",
                self.name
            ))),
        }
    }
}

/// Creates a [`ProviderService`] through `ProviderFactory`.
#[derive(Debug, Clone)]
pub struct ProviderConnector {
    pub provider_name: String,
    pub model: String,
}

impl ProviderConnector {
    pub fn new(provider_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            model: model.into(),
        }
    }
}

impl InferenceConnector for ProviderConnector {
    fn connect(&self, _credential: Option<&str>) -> Result<Arc<dyn InferenceService>, DocBatchError> {
        let provider =
            ProviderFactory::create_llm_provider(self.provider_name.as_str(), self.model.as_str())
                .map_err(|e| DocBatchError::ServiceUnavailable {
                    backend: self.provider_name.clone(),
                    hint: format!("{e}"),
                })?;
        Ok(Arc::new(ProviderService::new(&self.provider_name, provider)))
    }
}
