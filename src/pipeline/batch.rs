//! Batching: split encoded page images into fixed-size, ordered groups.
//!
//! Batch `i` holds images `[i * size, min((i + 1) * size, len))`. Splitting
//! is pure slicing: no reordering, no copying beyond the owned `Vec`s.

use crate::error::DocBatchError;

/// One page image ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// 0-based position of the page in the document.
    pub ordinal: usize,
    /// MIME type used in the data URI (e.g. `image/jpeg`).
    pub mime_type: String,
    /// Standard base64 of the image file bytes.
    pub data: String,
}

impl EncodedImage {
    pub fn new(ordinal: usize, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            ordinal,
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// `data:<mime>;base64,<data>` as accepted by `image_url` content parts.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A contiguous, non-empty group of images sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    images: Vec<EncodedImage>,
}

impl Batch {
    /// 0-based ordinal of this batch among all batches of a run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn images(&self) -> &[EncodedImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Always `false` for batches produced by [`split`].
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Partition `images` into batches of `batch_size`; the last may be short.
///
/// # Errors
/// [`DocBatchError::InvalidArgument`] when `batch_size` is 0. The check
/// happens before `images` is touched.
pub fn split(images: Vec<EncodedImage>, batch_size: usize) -> Result<Vec<Batch>, DocBatchError> {
    if batch_size == 0 {
        return Err(DocBatchError::InvalidArgument(
            "batch size must be a positive integer, got 0".into(),
        ));
    }

    let mut batches = Vec::with_capacity(images.len().div_ceil(batch_size));
    let mut rest = images.into_iter().peekable();
    while rest.peek().is_some() {
        let images: Vec<EncodedImage> = rest.by_ref().take(batch_size).collect();
        batches.push(Batch {
            index: batches.len(),
            images,
        });
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<EncodedImage> {
        (0..n)
            .map(|i| EncodedImage::new(i, "image/jpeg", format!("img{i}")))
            .collect()
    }

    fn ordinals(batch: &Batch) -> Vec<usize> {
        batch.images().iter().map(|i| i.ordinal).collect()
    }

    #[test]
    fn batch_count_is_ceiling() {
        for len in 0..=12 {
            for size in 1..=5 {
                let batches = split(images(len), size).unwrap();
                assert_eq!(batches.len(), len.div_ceil(size), "len={len} size={size}");
            }
        }
    }

    #[test]
    fn slices_are_contiguous_and_ordered() {
        let batches = split(images(7), 3).unwrap();
        assert_eq!(ordinals(&batches[0]), vec![0, 1, 2]);
        assert_eq!(ordinals(&batches[1]), vec![3, 4, 5]);
        assert_eq!(ordinals(&batches[2]), vec![6]);

        let indices: Vec<usize> = batches.iter().map(Batch::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn union_equals_input() {
        let input = images(11);
        let batches = split(input.clone(), 4).unwrap();
        let flattened: Vec<EncodedImage> = batches
            .into_iter()
            .flat_map(|b| b.images)
            .collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let batches = split(images(6), 3).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 3 && !b.is_empty()));
    }

    #[test]
    fn empty_input_yields_no_batches() {
        for size in 1..=4 {
            assert!(split(Vec::new(), size).unwrap().is_empty());
        }
    }

    #[test]
    fn zero_batch_size_is_invalid_argument() {
        let err = split(images(3), 0).unwrap_err();
        assert!(matches!(err, DocBatchError::InvalidArgument(_)));
        let err = split(Vec::new(), 0).unwrap_err();
        assert!(matches!(err, DocBatchError::InvalidArgument(_)));
    }

    #[test]
    fn data_uri_format() {
        let img = EncodedImage::new(0, "image/jpeg", "QUJD");
        assert_eq!(img.to_data_uri(), "data:image/jpeg;base64,QUJD");
    }
}
