//! Pipeline configuration and validation.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of projection components kept after dimensionality reduction.
pub const DEFAULT_COMPONENTS: usize = 50;

/// Cosine-similarity threshold above which two images are considered
/// duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Spatial size (width and height) images are resized to before embedding.
pub const DEFAULT_INPUT_SIZE: u32 = 299;

/// File extensions the scanner recognizes, lowercase.
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Similarity threshold {value} is outside (-1, 1]")]
    InvalidThreshold { value: f64 },

    #[error("Component count must be at least 1")]
    InvalidComponents,

    #[error("Embedder input size must be at least 1")]
    InvalidInputSize,
}

/// Tunables for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on the number of projection components. The effective
    /// count is clamped to the corpus size and the embedding dimension.
    pub components: usize,
    /// Grouping threshold, exclusive: a pair joins a group only when its
    /// cosine similarity is strictly greater than this value.
    pub threshold: f64,
    /// Recognized file extensions, matched case-insensitively.
    pub extensions: HashSet<String>,
    /// Spatial size handed to the embedder for input normalization.
    pub input_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            components: DEFAULT_COMPONENTS,
            threshold: DEFAULT_THRESHOLD,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    /// Replace the recognized extension set. Entries are lowercased so
    /// matching stays case-insensitive.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Check every tunable before any scanning work begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > -1.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold {
                value: self.threshold,
            });
        }
        if self.components == 0 {
            return Err(ConfigError::InvalidComponents);
        }
        if self.input_size == 0 {
            return Err(ConfigError::InvalidInputSize);
        }
        Ok(())
    }

    /// Whether `path` carries a recognized image extension.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(PipelineConfig::new().with_threshold(1.0).validate().is_ok());
        assert!(
            PipelineConfig::new()
                .with_threshold(-0.99)
                .validate()
                .is_ok()
        );
        assert!(
            PipelineConfig::new()
                .with_threshold(1.01)
                .validate()
                .is_err()
        );
        assert!(
            PipelineConfig::new()
                .with_threshold(-1.0)
                .validate()
                .is_err()
        );
        assert!(
            PipelineConfig::new()
                .with_threshold(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_zero_components_rejected() {
        assert!(PipelineConfig::new().with_components(0).validate().is_err());
    }

    #[test]
    fn test_zero_input_size_rejected() {
        assert!(PipelineConfig::new().with_input_size(0).validate().is_err());
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let config = PipelineConfig::default();
        assert!(config.matches_extension(&PathBuf::from("photo.jpg")));
        assert!(config.matches_extension(&PathBuf::from("photo.JPEG")));
        assert!(config.matches_extension(&PathBuf::from("scan.TIF")));
        assert!(!config.matches_extension(&PathBuf::from("clip.gif")));
        assert!(!config.matches_extension(&PathBuf::from("no_extension")));
    }

    #[test]
    fn test_custom_extensions_are_lowercased() {
        let config = PipelineConfig::new().with_extensions(["PNG", "Webp"]);
        assert!(config.matches_extension(&PathBuf::from("a.png")));
        assert!(config.matches_extension(&PathBuf::from("b.WEBP")));
        assert!(!config.matches_extension(&PathBuf::from("c.jpg")));
    }
}
