//! Result sinks: where the joined analysis text ends up.

use crate::error::DocBatchError;
use futures::future::BoxFuture;
use std::path::Path;
use tracing::info;

/// Accepts the final document text exactly once per analysis.
pub trait ResultSink: Send + Sync {
    fn write<'a>(&'a self, target: &'a Path, text: &'a str) -> BoxFuture<'a, Result<(), DocBatchError>>;
}

/// Writes the text as a UTF-8 file, creating or truncating it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl ResultSink for FileSink {
    fn write<'a>(&'a self, target: &'a Path, text: &'a str) -> BoxFuture<'a, Result<(), DocBatchError>> {
        Box::pin(async move {
            tokio::fs::write(target, text.as_bytes())
                .await
                .map_err(|source| DocBatchError::OutputWriteFailed {
                    path: target.to_path_buf(),
                    source,
                })?;
            info!("Result file: {}", target.display());
            Ok(())
        })
    }
}
