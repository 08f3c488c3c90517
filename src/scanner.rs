//! Directory scanning and corpus assembly.
//!
//! Walks a directory tree, decodes every file with a recognized image
//! extension, and embeds it with the injected [`Embedder`]. A file that
//! fails to decode or embed is logged and excluded; it never aborts the
//! scan. Paths are processed in lexicographic full-path order so the
//! resulting matrix rows are stable across platforms and filesystems.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image::DynamicImage;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::embedder::Embedder;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Successfully embedded corpus: lexicographically ordered paths, row-aligned
/// with the embedding matrix.
#[derive(Debug, Clone)]
pub struct Corpus {
    paths: Vec<PathBuf>,
    embeddings: Array2<f32>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn embeddings(&self) -> ArrayView2<'_, f32> {
        self.embeddings.view()
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }
}

/// A file that was recognized but could not be decoded or embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub corpus: Corpus,
    pub failures: Vec<ScanFailure>,
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub current_file: String,
}

type ProgressFn = dyn Fn(ScanProgress) + Send + Sync;

/// Walks a directory and turns it into a [`Corpus`] via the injected
/// [`Embedder`].
pub struct CorpusScanner<'a> {
    embedder: &'a dyn Embedder,
    extensions: HashSet<String>,
    cancellation_token: Arc<AtomicBool>,
    progress: Option<Arc<ProgressFn>>,
}

impl<'a> CorpusScanner<'a> {
    pub fn new(embedder: &'a dyn Embedder, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            extensions: config.extensions.clone(),
            cancellation_token: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Scan `root` recursively and embed every recognized image.
    ///
    /// An empty corpus (no candidate files, or every candidate failed) is a
    /// valid outcome, not an error.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome, ScanError> {
        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled);
        }

        if !root.exists() {
            return Err(ScanError::InvalidPath {
                path: root.to_string_lossy().to_string(),
            });
        }
        if !root.is_dir() {
            return Err(ScanError::InvalidPath {
                path: format!("{} is not a directory", root.to_string_lossy()),
            });
        }
        // An unreadable root aborts the run; unreadable entries below it are
        // skipped individually.
        fs::read_dir(root)?;

        let files = self.discover_files(root)?;
        let total_files = files.len();
        let processed = AtomicUsize::new(0);

        let outcomes: Result<Vec<_>, ScanError> = files
            .par_iter()
            .map(|path| {
                if self.cancellation_token.load(Ordering::Relaxed) {
                    return Err(ScanError::Cancelled);
                }

                let outcome = self.embed_file(path);

                let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                self.send_progress(ScanProgress {
                    files_processed: current,
                    total_files,
                    current_file: path.to_string_lossy().to_string(),
                });

                Ok(outcome)
            })
            .collect();

        let mut pairs = Vec::with_capacity(total_files);
        let mut failures = Vec::new();
        for outcome in outcomes? {
            match outcome {
                Ok(pair) => pairs.push(pair),
                Err(failure) => failures.push(failure),
            }
        }

        // Row order must not depend on worker scheduling.
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let dimension = self.embedder.dimension();
        let mut embeddings = Array2::zeros((pairs.len(), dimension));
        let mut paths = Vec::with_capacity(pairs.len());
        for (row, (path, vector)) in pairs.into_iter().enumerate() {
            embeddings
                .row_mut(row)
                .assign(&ArrayView1::from(&vector[..]));
            paths.push(path);
        }

        Ok(ScanOutcome {
            corpus: Corpus { paths, embeddings },
            failures,
        })
    }

    /// Collect candidate files in lexicographic full-path order. Traversal
    /// order varies by filesystem; the sort establishes the canonical order
    /// the grouping stage depends on.
    fn discover_files(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            if self.cancellation_token.load(Ordering::Relaxed) {
                return Err(ScanError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if self.extensions.contains(&ext.to_lowercase()) {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Decode and embed one file, isolating any failure to that file.
    fn embed_file(&self, path: &Path) -> Result<(PathBuf, Vec<f32>), ScanFailure> {
        let decoded = image::open(path).map_err(|e| {
            log::warn!("Failed to decode {}: {}", path.display(), e);
            ScanFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let canonical = DynamicImage::ImageRgb8(decoded.to_rgb8());
        let vector = self.embedder.embed(&canonical).map_err(|e| {
            log::warn!("Failed to embed {}: {}", path.display(), e);
            ScanFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if vector.len() != self.embedder.dimension() {
            let reason = format!(
                "embedder returned {} values, expected {}",
                vector.len(),
                self.embedder.dimension()
            );
            log::warn!("Failed to embed {}: {}", path.display(), reason);
            return Err(ScanFailure {
                path: path.to_path_buf(),
                reason,
            });
        }

        Ok((path.to_path_buf(), vector))
    }

    fn send_progress(&self, progress: ScanProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}
