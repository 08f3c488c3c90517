//! Linear variance-maximizing projection (principal component analysis).
//!
//! Refit on every run over the full embedding matrix; nothing is persisted
//! between runs. The eigendecomposition of the covariance matrix is computed
//! with cyclic Jacobi sweeps, which is exact for symmetric matrices and
//! fully deterministic.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Fitted projection onto the directions of maximal variance.
pub struct Pca {
    mean: Array1<f64>,
    /// `k x d`, rows orthonormal.
    components: Array2<f64>,
}

impl Pca {
    /// Fit on `data` (rows are observations). The effective component count
    /// is `min(target_components, n_rows, n_columns)`.
    ///
    /// Degenerate corpora never panic: with one row or fewer there is no
    /// variance to decompose and the fitted projection is the identity, so
    /// [`transform`](Self::transform) returns its input unchanged.
    pub fn fit(data: ArrayView2<'_, f32>, target_components: usize) -> Self {
        let n = data.nrows();
        let d = data.ncols();
        let k = target_components.min(n).min(d);

        if n <= 1 || k == 0 {
            return Self {
                mean: Array1::zeros(d),
                components: Array2::eye(d),
            };
        }

        let data = data.mapv(f64::from);
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(d));
        let centered = &data - &mean;
        let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

        let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(Ordering::Equal)
        });

        let mut components = Array2::zeros((k, d));
        for (row, &idx) in order.iter().take(k).enumerate() {
            components.row_mut(row).assign(&eigenvectors.column(idx));
        }

        Self { mean, components }
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Project `data` onto the fitted components. Row count is preserved.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Array2<f32> {
        let data = data.mapv(f64::from);
        let centered = &data - &self.mean;
        centered.dot(&self.components.t()).mapv(|v| v as f32)
    }

    pub fn fit_transform(data: ArrayView2<'_, f32>, target_components: usize) -> Array2<f32> {
        Self::fit(data, target_components).transform(data)
    }
}

/// Jacobi eigendecomposition of a symmetric matrix. Returns the eigenvalues
/// and a matrix whose columns are the matching eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    const MAX_SWEEPS: usize = 64;

    let d = a.nrows();
    let mut v = Array2::eye(d);

    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let tolerance = (norm * 1e-14).max(f64::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let off_diagonal = {
            let mut sum = 0.0;
            for p in 0..d {
                for q in (p + 1)..d {
                    sum += a[[p, q]] * a[[p, q]];
                }
            }
            sum.sqrt()
        };
        if off_diagonal <= tolerance {
            break;
        }

        for p in 0..d {
            for q in (p + 1)..d {
                let apq = a[[p, q]];
                if apq.abs() <= tolerance {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = if theta >= 0.0 {
                    1.0 / (theta + (1.0 + theta * theta).sqrt())
                } else {
                    1.0 / (theta - (1.0 + theta * theta).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                // A <- R^T A R, accumulated as a column then a row rotation.
                for i in 0..d {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for i in 0..d {
                    let api = a[[p, i]];
                    let aqi = a[[q, i]];
                    a[[p, i]] = c * api - s * aqi;
                    a[[q, i]] = s * api + c * aqi;
                }
                // V <- V R keeps the columns aligned with the eigenvalues.
                for i in 0..d {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues = Array1::from_iter((0..d).map(|i| a[[i, i]]));
    (eigenvalues, v)
}
