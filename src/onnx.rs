//! ONNX-backed embedding extractor.
//!
//! Runs a pretrained vision model exported to ONNX. Input and output tensor
//! names are taken from the model itself (first declared input/output), and
//! the embedding dimension is probed with a blank image at load time, so any
//! single-input feature extractor works without per-model wiring.

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;

use crate::embedder::{EmbedError, Embedder};

pub struct OnnxEmbedder {
    // `Session::run` needs exclusive access; the scanner embeds from rayon
    // workers through a shared reference.
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
    dimension: usize,
}

impl OnnxEmbedder {
    /// Load a model from disk and probe its output dimension.
    pub fn load(model_path: &Path, input_size: u32) -> Result<Self, EmbedError> {
        let session = Session::builder()
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| EmbedError::ModelLoad("model declares no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| EmbedError::ModelLoad("model declares no outputs".into()))?;

        let mut embedder = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size,
            dimension: 0,
        };
        let probe = embedder.run(&DynamicImage::new_rgb8(1, 1))?;
        if probe.is_empty() {
            return Err(EmbedError::ModelLoad(
                "model produced an empty output tensor".into(),
            ));
        }
        embedder.dimension = probe.len();
        Ok(embedder)
    }

    fn run(&self, image: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
        let pixels = preprocess(image, self.input_size);
        let input = ort::value::Value::from_array(pixels)
            .map_err(|e| EmbedError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbedError::Inference("embedder session poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| EmbedError::Inference(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            EmbedError::Inference(format!("model output '{}' missing", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Inference(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok(pool_output(&dims, data))
    }
}

impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, EmbedError> {
        self.run(image)
    }
}

/// Resize to the model's spatial size and lay the pixels out as NCHW f32
/// scaled to `[-1, 1]`.
fn preprocess(image: &DynamicImage, input_size: u32) -> (Vec<usize>, Vec<f32>) {
    let resized = image.resize_exact(input_size, input_size, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();
    let size = input_size as usize;

    let mut data = vec![0.0f32; 3 * size * size];
    for y in 0..size {
        for x in 0..size {
            let px = rgb.get_pixel(x as u32, y as u32);
            let idx = y * size + x;
            data[idx] = px[0] as f32 / 127.5 - 1.0;
            data[size * size + idx] = px[1] as f32 / 127.5 - 1.0;
            data[2 * size * size + idx] = px[2] as f32 / 127.5 - 1.0;
        }
    }
    (vec![1, 3, size, size], data)
}

/// Collapse the model output to a flat feature vector, mean-pooling a
/// sequence axis when present.
fn pool_output(dims: &[usize], data: &[f32]) -> Vec<f32> {
    match dims {
        [1, _] => data.to_vec(),
        [1, n, d] => {
            let mut pooled = vec![0.0f32; *d];
            for i in 0..*n {
                for j in 0..*d {
                    pooled[j] += data[i * d + j];
                }
            }
            pooled.iter_mut().for_each(|v| *v /= *n as f32);
            pooled
        }
        _ => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_output_passes_flat_vectors_through() {
        let data = [0.5, -0.25, 1.0];
        assert_eq!(pool_output(&[1, 3], &data), data.to_vec());
    }

    #[test]
    fn test_pool_output_mean_pools_sequence_axis() {
        // Two sequence steps of dimension 2.
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(pool_output(&[1, 2, 2], &data), vec![2.0, 3.0]);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = DynamicImage::new_rgb8(5, 9);
        let (shape, data) = preprocess(&image, 4);
        assert_eq!(shape, vec![1, 3, 4, 4]);
        assert_eq!(data.len(), 3 * 4 * 4);
        assert!(data.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
