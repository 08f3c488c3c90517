//! Find visually near-duplicate images.
//!
//! The pipeline embeds every image under a directory with an injected
//! [`Embedder`], reduces the embedding matrix with a variance-maximizing
//! linear projection, computes the pairwise cosine-similarity matrix, and
//! partitions the corpus into anchor-seeded duplicate groups plus a unique
//! remainder. File acquisition, rendering, and any deletion or persistence of
//! results belong to the caller; the library never mutates the scanned tree.

pub mod config;
pub mod embedder;
pub mod grouping;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pca;
pub mod pipeline;
pub mod scanner;
pub mod similarity;

pub use config::{ConfigError, PipelineConfig};
pub use embedder::{EmbedError, Embedder, HashEmbedder};
pub use grouping::{DuplicateGroup, GroupMember};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;
pub use pca::Pca;
pub use pipeline::{DedupReport, Pipeline, PipelineError};
pub use scanner::{Corpus, CorpusScanner, ScanError, ScanFailure, ScanOutcome};
