//! Linear algebra utilities
//!
//! Gaussian densities, covariance hygiene and positive-definiteness checks
//! shared by the updator, the combiner and the smoother.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use std::f64::consts::PI;

/// Relative tolerance for the positive semi-definite test.
///
/// A symmetric matrix is accepted when its smallest eigenvalue is at least
/// `-PSD_TOLERANCE * max(1, |largest eigenvalue|)`.
pub const PSD_TOLERANCE: f64 = 1e-10;

/// Number of diagonal-jitter attempts made by [`regularize_covariance`].
pub const REGULARIZATION_ATTEMPTS: usize = 6;

/// Compute log Gaussian PDF for numerical stability
///
/// # Arguments
/// * `x` - Point to evaluate
/// * `mu` - Mean vector
/// * `sigma` - Covariance matrix
///
/// # Returns
/// Log probability density, or `-inf` when `sigma` is not positive definite
pub fn log_gaussian_pdf(x: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
    let n = x.len() as f64;
    let diff = x - mu;

    match sigma.clone().cholesky() {
        Some(chol) => {
            let inv_sigma_diff = chol.solve(&diff);
            let mahalanobis = diff.dot(&inv_sigma_diff);
            // log|Σ| from the Cholesky factor avoids under/overflow of det()
            let log_det: f64 = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();

            -0.5 * (n * (2.0 * PI).ln() + log_det + mahalanobis)
        }
        None => f64::NEG_INFINITY,
    }
}

/// Compute squared Mahalanobis distance `dᵀ Σ⁻¹ d`
///
/// Returns `None` when `sigma` is not positive definite.
pub fn mahalanobis_squared(diff: &DVector<f64>, sigma: &DMatrix<f64>) -> Option<f64> {
    let chol = sigma.clone().cholesky()?;
    let inv_sigma_diff = chol.solve(diff);
    Some(diff.dot(&inv_sigma_diff))
}

/// Compute Mahalanobis distance
///
/// # Arguments
/// * `x` - Point
/// * `mu` - Mean vector
/// * `sigma` - Covariance matrix
///
/// # Returns
/// Mahalanobis distance (infinite for a singular covariance)
pub fn mahalanobis_distance(x: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
    mahalanobis_squared(&(x - mu), sigma)
        .map(f64::sqrt)
        .unwrap_or(f64::INFINITY)
}

/// Compute log-sum-exp for numerical stability
///
/// Computes log(sum(exp(x))) in a numerically stable way
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }

    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() && max_val < 0.0 {
        return f64::NEG_INFINITY;
    }

    let sum: f64 = values.iter().map(|v| (v - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Normalize log weights
///
/// Convert log weights to normalized linear weights. Entries equal to
/// `-inf` map to exactly zero. If every entry is `-inf` the result is all
/// zeros.
pub fn normalize_log_weights(log_weights: &[f64]) -> Vec<f64> {
    let log_sum = log_sum_exp(log_weights);
    if !log_sum.is_finite() {
        return vec![0.0; log_weights.len()];
    }
    log_weights.iter().map(|w| (w - log_sum).exp()).collect()
}

/// Check if matrix is positive definite
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    matrix.clone().cholesky().is_some()
}

/// Smallest eigenvalue of the symmetric part of `matrix`.
pub fn smallest_eigenvalue(matrix: &DMatrix<f64>) -> f64 {
    let eigen = SymmetricEigen::new(symmetrize(matrix));
    eigen.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min)
}

/// Check if a matrix is symmetric positive semi-definite within [`PSD_TOLERANCE`]
pub fn is_positive_semi_definite(matrix: &DMatrix<f64>) -> bool {
    if !matrix.is_square() || matrix.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let asymmetry = (matrix - matrix.transpose()).abs().max();
    let scale = matrix.abs().max().max(1.0);
    if asymmetry > 1e-8 * scale {
        return false;
    }

    let eigen = SymmetricEigen::new(symmetrize(matrix));
    let largest = eigen.eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let smallest = eigen.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
    smallest >= -PSD_TOLERANCE * largest.max(1.0)
}

/// Make matrix symmetric
///
/// Ensures a matrix is symmetric by averaging with its transpose
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (matrix + matrix.transpose())
}

/// Try to turn a nearly-PSD covariance into a PSD one.
///
/// Symmetrizes first, then adds a growing diagonal jitter. Returns `None`
/// if the matrix is still not PSD after [`REGULARIZATION_ATTEMPTS`].
pub fn regularize_covariance(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let mut candidate = symmetrize(matrix);
    if is_positive_semi_definite(&candidate) {
        return Some(candidate);
    }

    let n = candidate.nrows();
    let mean_diagonal = if n > 0 {
        candidate.diagonal().iter().map(|d| d.abs()).sum::<f64>() / n as f64
    } else {
        0.0
    };
    let base = 1e-12 * mean_diagonal.max(1.0);

    for attempt in 0..REGULARIZATION_ATTEMPTS {
        let jitter = base * 10f64.powi(attempt as i32);
        for i in 0..n {
            candidate[(i, i)] += jitter;
        }
        if is_positive_semi_definite(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Scale a covariance by per-parameter variance factors: `D C D` with
/// `D = diag(sqrt(factors))`.
///
/// Correlation coefficients are preserved.
pub fn scale_covariance(covariance: &DMatrix<f64>, factors: &[f64]) -> DMatrix<f64> {
    let d = DVector::from_iterator(factors.len(), factors.iter().map(|f| f.sqrt()));
    let mut scaled = covariance.clone();
    for i in 0..scaled.nrows() {
        for j in 0..scaled.ncols() {
            scaled[(i, j)] *= d[i] * d[j];
        }
    }
    scaled
}

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}
