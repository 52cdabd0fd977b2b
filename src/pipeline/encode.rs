//! Image encoding: page image file → base64 [`EncodedImage`].
//!
//! Encoding is I/O-bound (one file read per page) and runs with bounded,
//! order-preserving concurrency: `buffered` keeps at most `limit` reads in
//! flight and yields results in input order, so ordinals never need
//! re-sorting. One unreadable image aborts the whole run.

use crate::error::DocBatchError;
use crate::pipeline::batch::EncodedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Turns one image file into a transport-ready payload.
pub trait Encoder: Send + Sync {
    fn encode<'a>(
        &'a self,
        ordinal: usize,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<EncodedImage, DocBatchError>>;
}

/// Reads the file and base64-encodes its bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64FileEncoder;

impl Encoder for Base64FileEncoder {
    fn encode<'a>(
        &'a self,
        ordinal: usize,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<EncodedImage, DocBatchError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DocBatchError::EncodingFailure {
                    path: path.to_path_buf(),
                    source,
                })?;
            let data = STANDARD.encode(&bytes);
            debug!("Encoded {} → {} bytes base64", path.display(), data.len());
            Ok(EncodedImage::new(ordinal, mime_type_for(path), data))
        })
    }
}

/// MIME type from the file extension; JPEG unless the extension says otherwise.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Encode every image, at most `limit` at a time, preserving input order.
///
/// # Errors
/// The first [`DocBatchError::EncodingFailure`] aborts the call.
pub async fn encode_all(
    encoder: &dyn Encoder,
    paths: &[PathBuf],
    limit: usize,
) -> Result<Vec<EncodedImage>, DocBatchError> {
    stream::iter(paths.iter().enumerate())
        .map(|(ordinal, path)| encoder.encode(ordinal, path))
        .buffered(limit.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encodes_file_bytes_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image-1.jpg");
        std::fs::write(&path, b"ABC").unwrap();

        let img = Base64FileEncoder.encode(4, &path).await.unwrap();
        assert_eq!(img.ordinal, 4);
        assert_eq!(img.data, "QUJD");
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(STANDARD.decode(&img.data).unwrap(), b"ABC");
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("noext")), "image/jpeg");
    }

    #[tokio::test]
    async fn encode_all_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (1..=25)
            .map(|n| {
                let p = dir.path().join(format!("image-{n}.jpg"));
                std::fs::write(&p, format!("page {n}")).unwrap();
                p
            })
            .collect();

        let encoded = encode_all(&Base64FileEncoder, &paths, 20).await.unwrap();
        assert_eq!(encoded.len(), 25);
        for (i, img) in encoded.iter().enumerate() {
            assert_eq!(img.ordinal, i);
            let bytes = STANDARD.decode(&img.data).unwrap();
            assert_eq!(bytes, format!("page {}", i + 1).into_bytes());
        }
    }

    #[tokio::test]
    async fn one_missing_image_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("image-1.jpg");
        std::fs::write(&good, b"x").unwrap();
        let missing = dir.path().join("image-2.jpg");

        let err = encode_all(&Base64FileEncoder, &[good, missing.clone()], 4)
            .await
            .unwrap_err();
        match err {
            DocBatchError::EncodingFailure { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
