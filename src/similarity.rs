//! Pairwise cosine similarity over reduced embedding rows.

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// A zero-magnitude operand yields `0.0` (no similarity) instead of the NaN
/// a naive division would produce.
pub fn cosine(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Full pairwise similarity matrix, symmetric by construction: each
/// unordered pair is computed once and mirrored.
///
/// The diagonal is 1 for every non-degenerate row (0 for a zero row, per the
/// rule above); the grouping stage never reads it.
pub fn similarity_matrix(reduced: ArrayView2<'_, f32>) -> Array2<f64> {
    let n = reduced.nrows();
    let mut matrix = Array2::zeros((n, n));
    for i in 0..n {
        matrix[[i, i]] = if reduced.row(i).iter().all(|&v| v == 0.0) {
            0.0
        } else {
            1.0
        };
        for j in (i + 1)..n {
            let value = cosine(reduced.row(i), reduced.row(j));
            matrix[[i, j]] = value;
            matrix[[j, i]] = value;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identical_vectors_have_similarity_one() {
        let m = array![[1.0f32, 2.0, 3.0]];
        assert!((cosine(m.row(0), m.row(0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_orthogonal_vectors_have_similarity_zero() {
        let m = array![[1.0f32, 0.0], [0.0, 5.0]];
        assert_eq!(cosine(m.row(0), m.row(1)), 0.0);
    }

    #[test]
    fn test_opposite_vectors_have_similarity_negative_one() {
        let m = array![[2.0f32, -1.0], [-4.0, 2.0]];
        assert!((cosine(m.row(0), m.row(1)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_has_similarity_zero() {
        let m = array![[0.0f32, 0.0], [3.0, 4.0]];
        assert_eq!(cosine(m.row(0), m.row(1)), 0.0);
        assert_eq!(cosine(m.row(1), m.row(0)), 0.0);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let reduced = array![
            [1.0f32, 0.5, -0.25],
            [0.0, 2.0, 1.0],
            [-1.0, 0.0, 0.5],
            [3.0, 3.0, 3.0],
        ];
        let matrix = similarity_matrix(reduced.view());
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(matrix[[i, j]], matrix[[j, i]]);
            }
        }
    }

    #[test]
    fn test_matrix_diagonal() {
        let reduced = array![[1.0f32, 1.0], [0.0, 0.0]];
        let matrix = similarity_matrix(reduced.view());
        assert_eq!(matrix[[0, 0]], 1.0);
        // Zero row: degenerate self-similarity follows the zero-vector rule.
        assert_eq!(matrix[[1, 1]], 0.0);
    }

    #[test]
    fn test_values_stay_in_range() {
        let reduced = array![[1e-3f32, 1e3], [1e3, 1e-3], [5.0, 5.0]];
        let matrix = similarity_matrix(reduced.view());
        assert!(matrix.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
