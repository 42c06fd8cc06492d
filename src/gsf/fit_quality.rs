//! Fit quality aggregation over a smoothed trajectory

use super::errors::GsfError;
use super::types::{FitQuality, TrackStateType, Trajectory};
use super::NUMBER_OF_FIT_PARAMETERS;

/// Sum χ² and ndof over `Measurement` nodes, minus the fitted parameters
///
/// Outlier, perigee and auxiliary nodes do not contribute.
///
/// # Errors
/// `DegenerateFitQuality` if the summed χ² is non-finite or not positive
pub fn aggregate(trajectory: &Trajectory) -> Result<FitQuality, GsfError> {
    let (chi_squared, ndof) = trajectory
        .iter()
        .filter(|node| node.is(TrackStateType::Measurement))
        .map(|node| node.fit_quality())
        .fold((0.0, 0.0), |(chi2, ndof), fq| {
            (chi2 + fq.chi_squared(), ndof + fq.ndof())
        });
    let ndof = ndof - NUMBER_OF_FIT_PARAMETERS;

    if !chi_squared.is_finite() || chi_squared <= 0.0 {
        log::warn!(
            "degenerate fit quality: chi2 = {}, ndof = {}",
            chi_squared,
            ndof
        );
        return Err(GsfError::DegenerateFitQuality { chi_squared, ndof });
    }

    Ok(FitQuality::new(chi_squared, ndof))
}
