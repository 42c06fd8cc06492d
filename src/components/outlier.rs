//! Outlier policy shared by the forward filter and the smoother

use crate::gsf::types::FitQuality;

/// Whether an update is rejected: `chi2 > cutoff * ndof`
#[inline]
pub fn is_outlier(fit_quality: &FitQuality, cutoff: f64) -> bool {
    fit_quality.chi_squared() > cutoff * fit_quality.ndof()
}

/// Fit quality recorded on a node after the outlier decision
///
/// Rejected updates are stored with the nominal `(1, 1)` placeholder so a
/// single bad hit cannot dominate aggregate statistics.
pub fn recorded_fit_quality(fit_quality: FitQuality, cutoff: f64) -> (FitQuality, bool) {
    if is_outlier(&fit_quality, cutoff) {
        (FitQuality::nominal(), true)
    } else {
        (fit_quality, false)
    }
}
