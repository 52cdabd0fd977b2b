//! Input validation and output path resolution for one document.

use crate::error::DocBatchError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `path` names an existing `.pdf` file.
///
/// The extension check is case-insensitive. A missing file is reported as
/// [`DocBatchError::SourceUnavailable`] so callers can end the run quietly.
pub fn validate_document(path: &Path) -> Result<(), DocBatchError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(DocBatchError::InvalidArgument(format!(
            "only PDF documents are supported: {}",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(DocBatchError::SourceUnavailable {
            path: path.to_path_buf(),
        });
    }

    debug!("Validated document: {}", path.display());
    Ok(())
}

/// Where the analysis of `pdf_path` is written: same path, `.md` extension.
pub fn result_path_for(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("md")
}
