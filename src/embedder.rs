//! Embedding extraction boundary.
//!
//! The pipeline never constructs a model itself; it consumes anything that
//! implements [`Embedder`]. [`HashEmbedder`] is the always-available backend
//! used in tests and as a fallback when no model is configured; the
//! ONNX-backed extractor lives behind the `onnx` feature.

use image::DynamicImage;
use image::imageops::FilterType;
use thiserror::Error;

use crate::config::DEFAULT_INPUT_SIZE;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Inference failure: {0}")]
    Inference(String),
}

/// Produces a fixed-length visual embedding for a decoded image.
///
/// Implementations must be deterministic: identical pixel content yields an
/// identical vector. Input normalization (resizing to the target spatial
/// size, channel layout, value scaling) is the implementation's
/// responsibility; callers hand over a decoded RGB image as-is.
pub trait Embedder: Send + Sync {
    /// Length of every vector returned by [`embed`](Self::embed).
    fn dimension(&self) -> usize;

    /// Compute the embedding for `image`.
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, EmbedError>;
}

/// Deterministic content-hash embedder.
///
/// The image is resized to the configured spatial size, converted to RGB,
/// and its pixel bytes are fed through a BLAKE3 extended output, which is
/// then mapped to values in `[-1, 1]`. Byte-identical content maps to an
/// identical vector; any other content maps to an unrelated one, so this
/// backend groups exact duplicates only.
pub struct HashEmbedder {
    input_size: u32,
    dimension: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 128;

    pub fn new(input_size: u32) -> Self {
        Self::with_dimension(input_size, Self::DEFAULT_DIMENSION)
    }

    pub fn with_dimension(input_size: u32, dimension: usize) -> Self {
        Self {
            input_size,
            dimension,
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
        let canonical = image
            .resize_exact(self.input_size, self.input_size, FilterType::Triangle)
            .to_rgb8();

        let mut hasher = blake3::Hasher::new();
        hasher.update(canonical.as_raw());
        let mut reader = hasher.finalize_xof();

        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);

        let vector = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect();
        Ok(vector)
    }
}
