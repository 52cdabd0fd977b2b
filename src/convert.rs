//! End-to-end conversion: validate → render → analyze → write `.md`.
//!
//! [`convert`] wires the pdfium renderer and the configured inference
//! backend into an [`ImagesAnalyzer`]. [`convert_with`] takes both
//! collaborators explicitly.

use crate::analyze::ImagesAnalyzer;
use crate::config::{AnalysisConfig, API_KEY_ENV};
use crate::error::DocBatchError;
use crate::output::{format_execution_time, AnalysisOutput};
use crate::pipeline::input;
use crate::pipeline::render::{PdfiumRenderer, Renderer};
use crate::service::ark::ArkConnector;
use crate::service::provider::ProviderConnector;
use crate::service::InferenceConnector;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Convert a PDF into a text document written next to it as `<stem>.md`.
///
/// # Errors
/// * [`DocBatchError::InvalidArgument`] for a non-PDF path or a missing
///   credential, before rendering starts.
/// * [`DocBatchError::SourceUnavailable`] when the file does not exist.
/// * Any rendering or analysis error; no document is written in that case.
pub async fn convert(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, DocBatchError> {
    let renderer = PdfiumRenderer::new(config.dpi);
    convert_with(pdf_path, config, &renderer, connector_for(config)).await
}

/// [`convert`] with an explicit renderer and inference connector.
pub async fn convert_with(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
    renderer: &dyn Renderer,
    connector: Arc<dyn InferenceConnector>,
) -> Result<AnalysisOutput, DocBatchError> {
    let start = Instant::now();
    let pdf_path = pdf_path.as_ref();
    info!("Starting analysis: {}", pdf_path.display());

    input::validate_document(pdf_path)?;

    // Ark needs the key up front; provider backends read their own env vars.
    let api_key = config.resolve_api_key();
    if config.provider_name.is_none() && api_key.is_none() {
        return Err(DocBatchError::InvalidArgument(format!(
            "an API key must be provided either as an argument or in {API_KEY_ENV}"
        )));
    }

    let images = renderer.render(pdf_path).await?;
    info!("Rendered {} page images", images.len());

    let mut analyzer =
        ImagesAnalyzer::new(connector).with_encode_concurrency(config.encode_concurrency);
    if let Some(cb) = &config.progress_callback {
        analyzer = analyzer.with_progress(Arc::clone(cb));
    }

    let result_path = input::result_path_for(pdf_path);
    let mut output = analyzer
        .analyze(
            &images,
            &result_path,
            &config.model,
            api_key.as_deref(),
            config.batch_size,
        )
        .await?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    output.stats.total_duration_ms = elapsed_ms;
    info!(
        "File process done, total execution time: {}",
        format_execution_time(elapsed_ms)
    );
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    pdf_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, DocBatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocBatchError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(pdf_path, config))
}

/// The backend selected by `config`: a named provider, or Ark by default.
pub fn connector_for(config: &AnalysisConfig) -> Arc<dyn InferenceConnector> {
    match &config.provider_name {
        Some(name) => Arc::new(ProviderConnector::new(name, &config.model)),
        None => Arc::new(ArkConnector::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )),
    }
}
