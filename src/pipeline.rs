//! End-to-end duplicate detection: scan → reduce → similarity → group.
//!
//! Each run is self-contained: configuration is validated up front, every
//! intermediate structure lives only for the duration of [`Pipeline::run`],
//! and nothing is cached between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::embedder::Embedder;
use crate::grouping::{self, DuplicateGroup};
use crate::pca::Pca;
use crate::scanner::{CorpusScanner, ScanError, ScanFailure, ScanProgress};
use crate::similarity;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Result of one pipeline run.
///
/// An empty report (no groups, no uniques) means no images were embedded;
/// callers must treat that as a valid outcome, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupReport {
    /// Duplicate groups in corpus order, anchors first within each group.
    pub groups: Vec<DuplicateGroup>,
    /// Paths not absorbed into any group, in corpus order.
    pub unique: Vec<PathBuf>,
    /// Number of successfully embedded images.
    pub scanned: usize,
    /// Files that were recognized but could not be processed.
    pub failures: Vec<ScanFailure>,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    embedder: &'a dyn Embedder,
    cancellation_token: Arc<AtomicBool>,
    progress: Option<Arc<dyn Fn(ScanProgress) + Send + Sync>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, embedder: &'a dyn Embedder) -> Self {
        Self {
            config,
            embedder,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_progress(
        mut self,
        progress: impl Fn(ScanProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Token shared with the scanner; set it to stop the run at the next
    /// per-file checkpoint, or at the checkpoint between scanning and the
    /// whole-matrix stages.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Run the full pipeline over `root`.
    pub fn run(&self, root: &Path) -> Result<DedupReport, PipelineError> {
        // The only always-fatal class: reject bad tunables before touching
        // the filesystem.
        self.config.validate()?;

        let mut scanner = CorpusScanner::new(self.embedder, &self.config)
            .with_cancellation_token(self.cancellation_token.clone());
        if let Some(progress) = &self.progress {
            scanner = scanner.with_progress(progress.clone());
        }

        let started = Instant::now();
        let outcome = scanner.scan(root)?;
        log::info!(
            "embedded {} image(s) ({} failed) in {:.2?}",
            outcome.corpus.len(),
            outcome.failures.len(),
            started.elapsed()
        );

        if outcome.corpus.is_empty() {
            return Ok(DedupReport {
                groups: Vec::new(),
                unique: Vec::new(),
                scanned: 0,
                failures: outcome.failures,
            });
        }

        // Last checkpoint before committing to the whole-matrix work.
        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled.into());
        }

        let started = Instant::now();
        let reduced = Pca::fit_transform(outcome.corpus.embeddings(), self.config.components);
        let matrix = similarity::similarity_matrix(reduced.view());
        let (groups, unique) =
            grouping::group_duplicates(outcome.corpus.paths(), matrix.view(), self.config.threshold);
        log::info!(
            "grouped {} image(s) in {:.2?}: {} duplicate group(s), {} unique",
            outcome.corpus.len(),
            started.elapsed(),
            groups.len(),
            unique.len()
        );

        Ok(DedupReport {
            groups,
            unique,
            scanned: outcome.corpus.len(),
            failures: outcome.failures,
        })
    }
}
