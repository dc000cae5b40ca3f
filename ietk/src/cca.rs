//! Canonical correlation analysis over sparse samples.
//!
//! Both views are first reduced with a randomized SVD, then the canonical directions are found
//! by an SVD of the cross-correlation of the two orthonormal bases.

use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{IetkError, Result};
use crate::utils::SparseVector;

/// Projections found by [`cca()`].
pub struct CcaResult {
    /// Projection of the left view, shape `(left_dims, k)`.
    pub left: Array2<f64>,

    /// Projection of the right view, shape `(right_dims, k)`.
    pub right: Array2<f64>,

    /// Canonical correlations in descending order.
    pub correlations: Vec<f64>,
}

fn num_dims(rows: &[SparseVector]) -> usize {
    rows.iter()
        .flat_map(|r| r.iter().map(|&(i, _)| i as usize + 1))
        .max()
        .unwrap_or(0)
}

fn column_means(rows: &[SparseVector], dims: usize) -> Array1<f64> {
    let mut m = Array1::zeros(dims);
    for r in rows {
        for &(i, x) in r {
            m[i as usize] += x;
        }
    }
    m / rows.len() as f64
}

// Computes (A - 1 mean^T) x.
fn centered_mul(rows: &[SparseVector], mean: &Array1<f64>, x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), x.ncols()));
    for (mut o, r) in out.axis_iter_mut(Axis(0)).zip(rows) {
        for &(i, v) in r {
            o.scaled_add(v, &x.row(i as usize));
        }
    }
    let shift = mean.dot(x);
    out -= &shift;
    out
}

// Computes (A - 1 mean^T)^T y.
fn centered_t_mul(rows: &[SparseVector], mean: &Array1<f64>, y: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((mean.len(), y.ncols()));
    for (r, yr) in rows.iter().zip(y.axis_iter(Axis(0))) {
        for &(i, v) in r {
            out.row_mut(i as usize).scaled_add(v, &yr);
        }
    }
    let col_sums = y.sum_axis(Axis(0));
    for (mut o, &m) in out.axis_iter_mut(Axis(0)).zip(mean) {
        o.scaled_add(-m, &col_sums);
    }
    out
}

/// Orthonormalizes the columns in place with modified Gram-Schmidt.
///
/// Columns that become numerically zero are left as zeros.
pub(crate) fn orthonormalize(a: &mut Array2<f64>) {
    for j in 0..a.ncols() {
        for k in 0..j {
            let proj = a.column(j).dot(&a.column(k));
            let qk = a.column(k).to_owned();
            a.column_mut(j).scaled_add(-proj, &qk);
        }
        let norm = a.column(j).dot(&a.column(j)).sqrt();
        if norm > 1e-12 {
            a.column_mut(j).mapv_inplace(|x| x / norm);
        } else {
            a.column_mut(j).fill(0.0);
        }
    }
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the eigenvectors as columns.
pub(crate) fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::eye(n);
    for _sweep in 0..100 {
        let mut off = 0.0;
        for p in 0..n {
            for q in p + 1..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off < 1e-22 {
            break;
        }
        for p in 0..n {
            for q in p + 1..n {
                let apq = a[[p, q]];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));
    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let mut vectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}

// Thin SVD of a small dense matrix: returns (U, singular values, V).
fn small_svd(b: &Array2<f64>) -> (Array2<f64>, Vec<f64>, Array2<f64>) {
    let (values, u) = symmetric_eigen(b.dot(&b.t()));
    let sigma: Vec<f64> = values.iter().map(|&x| x.max(0.0).sqrt()).collect();
    let mut v = b.t().dot(&u);
    for (mut col, &s) in v.axis_iter_mut(Axis(1)).zip(&sigma) {
        if s > 1e-12 {
            col.mapv_inplace(|x| x / s);
        } else {
            col.fill(0.0);
        }
    }
    (u, sigma, v)
}

struct LowRank {
    u: Array2<f64>,
    sigma: Vec<f64>,
    v: Array2<f64>,
}

fn randomized_svd(
    rows: &[SparseVector],
    mean: &Array1<f64>,
    rank: usize,
    power_iters: usize,
    rng: &mut StdRng,
) -> LowRank {
    let dims = mean.len();
    let omega = Array2::from_shape_fn((dims, rank), |_| rng.gen_range(-1.0..1.0));
    let mut q = centered_mul(rows, mean, &omega);
    orthonormalize(&mut q);
    for _ in 0..power_iters {
        let mut z = centered_t_mul(rows, mean, &q);
        orthonormalize(&mut z);
        q = centered_mul(rows, mean, &z);
        orthonormalize(&mut q);
    }
    let b = centered_t_mul(rows, mean, &q).reversed_axes();
    let (ub, sigma, v) = small_svd(&b);
    LowRank {
        u: q.dot(&ub),
        sigma,
        v,
    }
}

// V diag(1 / sigma) A, dropping directions with negligible singular values.
fn whitened_projection(low: &LowRank, rotation: &Array2<f64>) -> Array2<f64> {
    let max = low.sigma.first().copied().unwrap_or(0.0);
    let mut scaled = low.v.clone();
    for (mut col, &s) in scaled.axis_iter_mut(Axis(1)).zip(&low.sigma) {
        if s > 1e-8 * max && s > 0.0 {
            col.mapv_inplace(|x| x / s);
        } else {
            col.fill(0.0);
        }
    }
    scaled.dot(rotation)
}

/// Runs canonical correlation analysis.
///
/// # Arguments
///
/// * `left` - Samples of the left view.
/// * `right` - Samples of the right view, aligned with `left`.
/// * `num_correlations` - The number of canonical directions to keep.
/// * `extra_rank` - Oversampling of the randomized SVD.
/// * `power_iters` - Power iterations of the randomized SVD.
/// * `seed` - Seed of the random projection.
///
/// # Errors
///
/// If the views are empty or have different numbers of samples, an error variant will be
/// returned.
pub fn cca(
    left: &[SparseVector],
    right: &[SparseVector],
    num_correlations: usize,
    extra_rank: usize,
    power_iters: usize,
    seed: u64,
) -> Result<CcaResult> {
    if left.len() != right.len() {
        return Err(IetkError::invalid_argument(
            "right",
            "both views must have the same number of samples",
        ));
    }
    if left.is_empty() {
        return Err(IetkError::insufficient_data("CCA needs at least one sample"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let left_dims = num_dims(left);
    let right_dims = num_dims(right);
    let left_mean = column_means(left, left_dims);
    let right_mean = column_means(right, right_dims);

    let rank = num_correlations + extra_rank;
    let left_rank = rank.min(left_dims).min(left.len()).max(1);
    let right_rank = rank.min(right_dims).min(right.len()).max(1);
    let l = randomized_svd(left, &left_mean, left_rank, power_iters, &mut rng);
    let r = randomized_svd(right, &right_mean, right_rank, power_iters, &mut rng);

    let cross = l.u.t().dot(&r.u);
    let (a, correlations, b) = small_svd(&cross);

    let k = num_correlations.min(left_rank).min(right_rank);
    let left_proj = whitened_projection(&l, &a.slice(s![.., ..k]).to_owned());
    let right_proj = whitened_projection(&r, &b.slice(s![.., ..k]).to_owned());

    // Pad so that every requested direction exists, even when a view has a small rank.
    let mut left_out = Array2::zeros((left_dims, num_correlations));
    left_out.slice_mut(s![.., ..k]).assign(&left_proj);
    let mut right_out = Array2::zeros((right_dims, num_correlations));
    right_out.slice_mut(s![.., ..k]).assign(&right_proj);
    let mut correlations: Vec<f64> = correlations.into_iter().take(k).collect();
    correlations.resize(num_correlations, 0.0);

    Ok(CcaResult {
        left: left_out,
        right: right_out,
        correlations,
    })
}

/// Projects a sparse vector: returns `proj^T x`.
pub fn project(proj: &Array2<f64>, x: &[(u32, f64)]) -> Array1<f64> {
    let mut out = Array1::zeros(proj.ncols());
    for &(i, v) in x {
        if (i as usize) < proj.nrows() {
            out.scaled_add(v, &proj.row(i as usize));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_eigen() {
        let a = ndarray::arr2(&[[2.0, 1.0], [1.0, 2.0]]);
        let (values, vectors) = symmetric_eigen(a.clone());
        assert!((values[0] - 3.0).abs() < 1e-9);
        assert!((values[1] - 1.0).abs() < 1e-9);
        let v0 = vectors.column(0);
        let av = a.dot(&v0);
        for i in 0..2 {
            assert!((av[i] - 3.0 * v0[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_orthonormalize() {
        let mut a = ndarray::arr2(&[[1.0, 1.0], [0.0, 1.0], [1.0, 0.0]]);
        orthonormalize(&mut a);
        let gram = a.t().dot(&a);
        assert!((gram[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((gram[[1, 1]] - 1.0).abs() < 1e-9);
        assert!(gram[[0, 1]].abs() < 1e-9);
    }

    #[test]
    fn test_cca_finds_shared_signal() {
        // The left index and the right index are the same latent class.
        let mut left = vec![];
        let mut right = vec![];
        for i in 0..200u32 {
            let c = i % 4;
            left.push(vec![(c, 1.0), (4 + (i * 7) % 3, 0.1)]);
            right.push(vec![(c, 1.0)]);
        }
        let result = cca(&left, &right, 2, 4, 3, 0).unwrap();
        assert_eq!(2, result.correlations.len());
        assert!(result.correlations[0] > 0.95);
        assert_eq!((7, 2), result.left.dim());
        assert_eq!((4, 2), result.right.dim());

        let a = project(&result.left, &left[0]);
        let b = project(&result.right, &right[0]);
        assert_eq!(2, a.len());
        assert_eq!(2, b.len());
    }

    #[test]
    fn test_cca_rejects_misaligned() {
        assert!(cca(&[vec![(0, 1.0)]], &[], 1, 1, 1, 0).is_err());
        assert!(cca(&[], &[], 1, 1, 1, 0).is_err());
    }
}
