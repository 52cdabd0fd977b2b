//! Ark backend: OpenAI-compatible streaming chat completions over HTTP.
//!
//! Every batch is one `POST {base_url}/chat/completions` with
//! `stream: true` and `stream_options.include_usage: true`, so the endpoint
//! ends each stream with a dedicated usage chunk. The body is decoded by
//! [`crate::service::sse`].
//!
//! The `reqwest::Client` (and its connection pool) is shared by every batch
//! task of a run. [`ArkService::shutdown`] drops the service's copy of the
//! client; requests already streaming hold their own clone and finish
//! undisturbed.

use crate::config::API_KEY_ENV;
use crate::error::{DocBatchError, StreamError};
use crate::pipeline::request::AnalysisRequest;
use crate::service::{sse, ChunkStream, InferenceConnector, InferenceService};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Idle connections kept per host.
const POOL_MAX_IDLE_PER_HOST: usize = 5;

/// How long an idle pooled connection survives.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest error body kept in [`StreamError::Http`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ArkChatRequest<'a> {
    #[serde(flatten)]
    request: &'a AnalysisRequest,
    stream: bool,
    stream_options: StreamOptions,
}

impl<'a> ArkChatRequest<'a> {
    fn streaming(request: &'a AnalysisRequest) -> Self {
        Self {
            request,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }
}

/// Streaming chat client for one analysis run.
pub struct ArkService {
    base_url: String,
    api_key: String,
    client: Mutex<Option<reqwest::Client>>,
}

impl ArkService {
    /// Build a client with a small idle pool and a whole-request timeout.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DocBatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| DocBatchError::ServiceUnavailable {
                backend: "ark".into(),
                hint: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Mutex::new(Some(client)),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn client(&self) -> Result<reqwest::Client, StreamError> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(StreamError::ServiceClosed)
    }
}

impl InferenceService for ArkService {
    fn name(&self) -> &str {
        "ark"
    }

    fn stream_chat<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<ChunkStream, StreamError>> {
        Box::pin(async move {
            let client = self.client()?;
            debug!(
                "Batch {}: POST {} ({} images, max_tokens {})",
                request.batch_index,
                self.completions_url(),
                request.image_count,
                request.max_tokens
            );

            let response = client
                .post(self.completions_url())
                .bearer_auth(&self.api_key)
                .json(&ArkChatRequest::streaming(request))
                .send()
                .await
                .map_err(|e| StreamError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let mut body = response.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|&i| body.is_char_boundary(i))
                        .unwrap_or(0);
                    body.truncate(cut);
                }
                return Err(StreamError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(sse::decode_stream(response.bytes_stream()))
        })
    }

    fn shutdown(&self) -> Result<(), DocBatchError> {
        let released = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match released {
            Some(_) => {
                debug!("Ark client released");
                Ok(())
            }
            None => Err(DocBatchError::ResourceCleanupFailure(
                "ark service was already shut down".into(),
            )),
        }
    }
}

/// Creates one [`ArkService`] per analysis.
#[derive(Debug, Clone)]
pub struct ArkConnector {
    pub base_url: String,
    pub timeout: Duration,
}

impl ArkConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl InferenceConnector for ArkConnector {
    fn connect(&self, credential: Option<&str>) -> Result<Arc<dyn InferenceService>, DocBatchError> {
        let key = credential
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DocBatchError::InvalidArgument(format!(
                    "an API key must be provided either as an argument or in {API_KEY_ENV}"
                ))
            })?;
        Ok(Arc::new(ArkService::new(key, &self.base_url, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::batch::{split, EncodedImage};
    use crate::pipeline::request::build;

    fn request() -> AnalysisRequest {
        let batch = split(vec![EncodedImage::new(0, "image/jpeg", "AAAA")], 1)
            .unwrap()
            .remove(0);
        build("doubao-seed-1.6-vision", &batch)
    }

    fn service() -> ArkService {
        ArkService::new("sk-test", "https://example.invalid/api/v3/", Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            service().completions_url(),
            "https://example.invalid/api/v3/chat/completions"
        );
    }

    #[test]
    fn request_body_enables_streaming_usage() {
        let req = request();
        let json = serde_json::to_value(ArkChatRequest::streaming(&req)).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["model"], "doubao-seed-1.6-vision");
        assert_eq!(json["thinking"]["type"], "disabled");
        assert_eq!(json["messages"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn shutdown_twice_is_a_cleanup_failure() {
        let svc = service();
        assert!(svc.shutdown().is_ok());
        assert!(matches!(
            svc.shutdown(),
            Err(DocBatchError::ResourceCleanupFailure(_))
        ));
    }

    #[tokio::test]
    async fn stream_after_shutdown_is_refused() {
        let svc = service();
        svc.shutdown().unwrap();
        let req = request();
        let result = svc.stream_chat(&req).await;
        assert!(matches!(result, Err(StreamError::ServiceClosed)));
    }

    #[test]
    fn connector_requires_a_credential() {
        let connector = ArkConnector::new("https://example.invalid", Duration::from_secs(5));
        assert!(matches!(
            connector.connect(None),
            Err(DocBatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            connector.connect(Some("  ")),
            Err(DocBatchError::InvalidArgument(_))
        ));
        let svc = connector.connect(Some("sk-test")).expect("service");
        assert_eq!(svc.name(), "ark");
    }
}
