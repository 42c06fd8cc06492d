//! Generic assertion functions for numerical comparisons with tolerance

use gsf::common::linalg::is_positive_semi_definite;
use gsf::{MultiComponentState, TrackParam, TrackParameters};
use nalgebra::{DMatrix, DVector};

/// Compare scalar values with tolerance
pub fn assert_scalar_close(actual: f64, expected: f64, tolerance: f64, field_name: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "{}: expected {}, got {} (diff: {}, tolerance: {})",
        field_name,
        expected,
        actual,
        diff,
        tolerance
    );
}

/// Compare DVector with tolerance
pub fn assert_dvector_close(
    actual: &DVector<f64>,
    expected: &DVector<f64>,
    tolerance: f64,
    field_name: &str,
) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{}: dimension mismatch (actual: {}, expected: {})",
        field_name,
        actual.len(),
        expected.len()
    );

    for i in 0..actual.len() {
        let diff = (actual[i] - expected[i]).abs();
        assert!(
            diff <= tolerance,
            "{}[{}]: expected {}, got {} (diff: {}, tolerance: {})",
            field_name,
            i,
            expected[i],
            actual[i],
            diff,
            tolerance
        );
    }
}

/// Compare DMatrix with tolerance
pub fn assert_dmatrix_close(
    actual: &DMatrix<f64>,
    expected: &DMatrix<f64>,
    tolerance: f64,
    field_name: &str,
) {
    assert_eq!(
        actual.shape(),
        expected.shape(),
        "{}: shape mismatch",
        field_name
    );

    for i in 0..actual.nrows() {
        for j in 0..actual.ncols() {
            let diff = (actual[(i, j)] - expected[(i, j)]).abs();
            assert!(
                diff <= tolerance,
                "{}[{},{}]: expected {}, got {} (diff: {}, tolerance: {})",
                field_name,
                i,
                j,
                expected[(i, j)],
                actual[(i, j)],
                diff,
                tolerance
            );
        }
    }
}

/// Weights finite, non-negative and summing to one
pub fn assert_mixture_valid(mixture: &MultiComponentState, field_name: &str) {
    assert!(!mixture.is_empty(), "{}: empty mixture", field_name);
    for (i, c) in mixture.iter().enumerate() {
        assert!(
            c.weight.is_finite() && c.weight >= 0.0,
            "{}: component {} has weight {}",
            field_name,
            i,
            c.weight
        );
        if let Some(cov) = &c.covariance {
            assert!(
                is_positive_semi_definite(cov),
                "{}: component {} covariance is not PSD",
                field_name,
                i
            );
        }
    }
    assert_scalar_close(mixture.total_weight(), 1.0, 1e-9, field_name);
}

/// `|estimate - truth| <= n_sigma * error` for one parameter
pub fn assert_within_sigma(
    estimate: &TrackParameters,
    truth: &TrackParameters,
    param: TrackParam,
    n_sigma: f64,
) {
    let error = estimate
        .error(param)
        .unwrap_or_else(|| panic!("{:?}: estimate has no covariance", param));
    let pull = (estimate.get(param) - truth.get(param)) / error;
    assert!(
        pull.abs() <= n_sigma,
        "{:?}: estimate {} vs truth {} (error {}, pull {:.2})",
        param,
        estimate.get(param),
        truth.get(param),
        error,
        pull
    );
}
