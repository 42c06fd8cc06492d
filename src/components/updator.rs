//! Per-component Kalman measurement update of a Gaussian mixture.
//!
//! Each component is updated independently and reweighted by the Gaussian
//! likelihood of its innovation. Weights are handled in log space so that a
//! component far away from the measurement cannot underflow the others.
//!
//! ```text
//! r  = m - H x                 innovation
//! S  = H P Hᵀ + V              innovation covariance
//! K  = P Hᵀ S⁻¹                gain
//! x' = x + K r
//! P' = (I - K H) P (I - K H)ᵀ + K V Kᵀ
//! w' ∝ w · N(r; 0, S)
//! ```

use nalgebra::{DMatrix, DVector};

use crate::common::linalg::{log_gaussian_pdf, normalize_log_weights, symmetrize, wrap_angle};
use crate::gsf::errors::GsfError;
use crate::gsf::types::{
    Component, ComponentVec, FitQuality, Measurement, MultiComponentState, TrackParam,
    N_TRACK_PARAMS,
};

/// Prior variances substituted for components that carry no covariance.
pub const DEFAULT_PRIOR_VARIANCES: [f64; N_TRACK_PARAMS] = [250.0, 250.0, 0.25, 0.25, 1e-6];

/// Large diagonal prior for components without a covariance
pub fn default_prior_covariance() -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_row_slice(&DEFAULT_PRIOR_VARIANCES))
}

/// Result of updating one component
struct ComponentUpdate {
    parameters: DVector<f64>,
    covariance: DMatrix<f64>,
    chi_squared: f64,
    log_likelihood: f64,
}

/// Residual `m - H x`, with azimuthal residuals wrapped into `(-pi, pi]`
fn residual(measurement: &Measurement, parameters: &DVector<f64>) -> DVector<f64> {
    let mut r = measurement.parameters() - measurement.projection() * parameters;
    for (row, param) in measurement.measured().iter().enumerate() {
        if *param == TrackParam::Phi {
            r[row] = wrap_angle(r[row]);
        }
    }
    r
}

fn update_component(component: &Component, measurement: &Measurement) -> Option<ComponentUpdate> {
    let h = measurement.projection();
    let v = measurement.covariance();
    let p = component
        .covariance
        .clone()
        .unwrap_or_else(default_prior_covariance);

    let r = residual(measurement, &component.parameters);
    let s = &h * &p * h.transpose() + v;
    let s_inv = s.clone().cholesky()?.inverse();

    let k = &p * h.transpose() * &s_inv;
    let mut parameters = &component.parameters + &k * &r;
    let phi = TrackParam::Phi.index();
    parameters[phi] = wrap_angle(parameters[phi]);

    // Joseph form keeps the covariance symmetric PSD
    let i_minus_kh = DMatrix::identity(N_TRACK_PARAMS, N_TRACK_PARAMS) - &k * &h;
    let covariance =
        symmetrize(&(&i_minus_kh * &p * i_minus_kh.transpose() + &k * v * k.transpose()));

    if covariance.diagonal().iter().any(|d| !d.is_finite() || *d <= 0.0)
        || parameters.iter().any(|x| !x.is_finite())
    {
        return None;
    }

    let chi_squared = r.dot(&(&s_inv * &r));
    let log_likelihood = log_gaussian_pdf(&r, &DVector::zeros(r.len()), &s);

    Some(ComponentUpdate {
        parameters,
        covariance,
        chi_squared,
        log_likelihood,
    })
}

/// Update a predicted mixture with one measurement
///
/// # Arguments
/// * `predicted` - Predicted mixture on the measurement surface
/// * `measurement` - Calibrated measurement
///
/// # Returns
/// The updated, renormalized mixture and its fit quality. χ² is the
/// posterior-weighted sum of the component χ²; ndof is the measurement
/// dimension.
///
/// # Errors
/// * `EmptyMixture` if `predicted` has no components
/// * `UpdateFailed` if no component survives the update (singular
///   innovation covariance or vanishing likelihood everywhere)
pub fn update(
    predicted: &MultiComponentState,
    measurement: &Measurement,
) -> Result<(MultiComponentState, FitQuality), GsfError> {
    if predicted.is_empty() {
        return Err(GsfError::EmptyMixture);
    }

    let mut updates: Vec<ComponentUpdate> = Vec::with_capacity(predicted.len());
    let mut log_weights: Vec<f64> = Vec::with_capacity(predicted.len());

    for component in predicted.iter() {
        if !(component.weight.is_finite() && component.weight > 0.0) {
            continue;
        }
        match update_component(component, measurement) {
            Some(u) => {
                log_weights.push(component.weight.ln() + u.log_likelihood);
                updates.push(u);
            }
            None => {
                log::debug!("component dropped: singular innovation covariance");
            }
        }
    }

    if updates.is_empty() {
        return Err(GsfError::UpdateFailed {
            description: format!(
                "all {} components have a singular innovation covariance",
                predicted.len()
            ),
        });
    }

    let weights = normalize_log_weights(&log_weights);
    let mut components = ComponentVec::new();
    let mut chi_squared = 0.0;

    for (u, w) in updates.into_iter().zip(weights) {
        if w <= 0.0 || !w.is_finite() {
            continue;
        }
        chi_squared += w * u.chi_squared;
        components.push(Component::new(w, u.parameters, u.covariance));
    }

    if components.is_empty() {
        return Err(GsfError::UpdateFailed {
            description: "measurement likelihood vanishes for every component".to_string(),
        });
    }

    let mut updated = MultiComponentState::from_components(*predicted.surface(), components);
    // Dropping underflowed components can leave a tiny deficit
    updated.normalize_weights();

    Ok((
        updated,
        FitQuality::new(chi_squared, measurement.dim() as f64),
    ))
}

/// Fit quality of an already-updated (or smoothed) mixture
///
/// Uses the residual covariance of a state that already contains the
/// measurement, `R = V - H P Hᵀ`, weighted over components with a
/// covariance.
pub fn fit_quality(
    state: &MultiComponentState,
    measurement: &Measurement,
) -> Result<FitQuality, GsfError> {
    if state.is_empty() {
        return Err(GsfError::EmptyMixture);
    }

    let h = measurement.projection();
    let mut chi_squared = 0.0;
    let mut used_weight = 0.0;

    for component in state.iter() {
        let Some(p) = &component.covariance else {
            continue;
        };
        let r = residual(measurement, &component.parameters);
        let residual_covariance = symmetrize(&(measurement.covariance() - &h * p * h.transpose()));
        let Some(chol) = residual_covariance.cholesky() else {
            continue;
        };
        let chi2 = r.dot(&chol.solve(&r));
        if chi2.is_finite() {
            chi_squared += component.weight * chi2;
            used_weight += component.weight;
        }
    }

    if used_weight <= 0.0 {
        return Err(GsfError::UpdateFailed {
            description: "no component has a positive definite residual covariance".to_string(),
        });
    }

    Ok(FitQuality::new(
        chi_squared / used_weight,
        measurement.dim() as f64,
    ))
}
