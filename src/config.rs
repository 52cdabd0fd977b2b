//! Configuration types for a document analysis run.
//!
//! All run behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. Decoding parameters (temperature, nucleus
//! threshold, token ceilings) are deliberately absent: they are fixed policy
//! in [`crate::pipeline::request`].

use crate::error::DocBatchError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Default OpenAI-compatible endpoint for the Ark inference service.
pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Environment variable holding the API key when none is passed explicitly.
pub const API_KEY_ENV: &str = "VOLC_APIKEY";

/// Upper bound on concurrent image encodings.
pub const MAX_ENCODE_CONCURRENCY: usize = 20;

/// Configuration for one document analysis.
///
/// # Example
/// ```rust
/// use docbatch::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("doubao-seed-1.6-vision")
///     .batch_size(5)
///     .api_key("sk-test")
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size, 5);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Model identifier sent with every request.
    pub model: String,

    /// Number of page images per inference request. Must be ≥ 1. Default: 5.
    ///
    /// Every batch becomes one concurrent request, so the batch size also
    /// decides how many requests a document fans out into.
    pub batch_size: usize,

    /// API key for the Ark backend. Falls back to [`API_KEY_ENV`].
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible chat completions API.
    pub base_url: String,

    /// Use an `edgequake-llm` provider (e.g. "openai") instead of Ark.
    pub provider_name: Option<String>,

    /// Rendering DPI for page images. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Concurrent image encodings. Range: 1–20. Default: 20.
    pub encode_concurrency: usize,

    /// HTTP client timeout per request in seconds. Default: 600.
    ///
    /// A whole batch streams inside one request, so this must cover the
    /// slowest batch, not a single chunk.
    pub request_timeout_secs: u64,

    /// Optional observer for per-batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            batch_size: 5,
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            provider_name: None,
            dpi: 150,
            encode_concurrency: MAX_ENCODE_CONCURRENCY,
            request_timeout_secs: 600,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("provider_name", &self.provider_name)
            .field("dpi", &self.dpi)
            .field("encode_concurrency", &self.encode_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The explicit API key, or the value of [`API_KEY_ENV`].
    ///
    /// Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn encode_concurrency(mut self, n: usize) -> Self {
        self.config.encode_concurrency = n.clamp(1, MAX_ENCODE_CONCURRENCY);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, DocBatchError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(DocBatchError::InvalidArgument(
                "model must not be empty".into(),
            ));
        }
        if c.batch_size == 0 {
            return Err(DocBatchError::InvalidArgument(
                "batch size must be ≥ 1, got 0".into(),
            ));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(DocBatchError::InvalidArgument(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}
