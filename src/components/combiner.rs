//! Gaussian mixture combination and reduction
//!
//! - [`collapse_to_single`] - moment matching of a whole mixture
//! - [`combine`] - product of two mixtures describing the same surface
//! - [`Reduction`] - component cap with optional Mahalanobis merging

use nalgebra::{DMatrix, DVector};

use crate::common::linalg::{
    is_positive_semi_definite, log_gaussian_pdf, mahalanobis_distance, normalize_log_weights,
    regularize_covariance, symmetrize, wrap_angle,
};
use crate::gsf::config::GsfConfig;
use crate::gsf::errors::GsfError;
use crate::gsf::types::{Component, ComponentVec, MultiComponentState, TrackParam, TrackParameters};
use crate::gsf::NUMERICAL_ZERO;

const PHI: usize = TrackParam::Phi.index();

/// `to - from` with the azimuthal entry taken the short way round
fn parameter_difference(to: &DVector<f64>, from: &DVector<f64>) -> DVector<f64> {
    let mut diff = to - from;
    diff[PHI] = wrap_angle(diff[PHI]);
    diff
}

// ============================================================================
// Collapse
// ============================================================================

/// Collapse a mixture into one Gaussian by moment matching
///
/// ```text
/// mean = Σ w_i x_i
/// cov  = Σ w_i (P_i + (x_i - mean)(x_i - mean)ᵀ)
/// ```
///
/// Azimuthal angles are unwrapped around the first component before
/// averaging and the result is wrapped back into `(-pi, pi]`. A single
/// component is returned as is. If any component lacks a covariance the
/// result has none either.
///
/// # Errors
/// * `EmptyMixture` for an empty mixture
/// * `CombinerFailed` if the total weight is not positive
pub fn collapse_to_single(state: &MultiComponentState) -> Result<TrackParameters, GsfError> {
    let components = state.components();
    let Some(first) = components.first() else {
        return Err(GsfError::EmptyMixture);
    };

    if components.len() == 1 {
        return TrackParameters::new(
            first.parameters.clone(),
            first.covariance.clone(),
            *state.surface(),
        );
    }

    let total = state.total_weight();
    if !(total > NUMERICAL_ZERO) || !total.is_finite() {
        return Err(GsfError::CombinerFailed {
            description: format!("cannot collapse mixture with total weight {}", total),
        });
    }

    let reference_phi = first.parameters[PHI];
    let unwrapped: Vec<DVector<f64>> = components
        .iter()
        .map(|c| {
            let mut x = c.parameters.clone();
            x[PHI] = reference_phi + wrap_angle(x[PHI] - reference_phi);
            x
        })
        .collect();

    let dim = first.parameters.len();
    let mut mean = DVector::zeros(dim);
    for (c, x) in components.iter().zip(&unwrapped) {
        mean += x * (c.weight / total);
    }

    let covariance = if state.all_have_covariance() {
        let mut cov = DMatrix::zeros(dim, dim);
        for (c, x) in components.iter().zip(&unwrapped) {
            let w = c.weight / total;
            let d = x - &mean;
            if let Some(p) = &c.covariance {
                cov += (p + &d * d.transpose()) * w;
            }
        }
        Some(symmetrize(&cov))
    } else {
        None
    };

    mean[PHI] = wrap_angle(mean[PHI]);
    TrackParameters::new(mean, covariance, *state.surface())
}

// ============================================================================
// Reduction
// ============================================================================

/// Component-count reduction policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    /// Maximum components after reduction
    pub max_components: usize,
    /// Merge pairs closer than this Mahalanobis distance before pruning
    pub merge_threshold: Option<f64>,
}

impl Reduction {
    /// Prune lowest weights down to `max_components`
    pub fn prune(max_components: usize) -> Self {
        Self {
            max_components,
            merge_threshold: None,
        }
    }

    pub fn from_config(config: &GsfConfig) -> Self {
        Self {
            max_components: config.maximum_number_of_components,
            merge_threshold: config.merge_threshold,
        }
    }

    /// Reduce a mixture to at most `max_components` components
    ///
    /// # Algorithm
    /// 1. If a merge threshold is set and every component has a covariance,
    ///    merge the closest pairs (see [`merge_components_by_mahalanobis`])
    /// 2. Sort by weight (descending, stable), keep the top `max_components`
    /// 3. Renormalize kept weights
    pub fn apply(&self, state: MultiComponentState) -> MultiComponentState {
        let surface = *state.surface();
        let merge = self.merge_threshold.filter(|_| state.all_have_covariance());
        let mut components: Vec<Component> = state.into_components().into_vec();

        if let Some(threshold) = merge {
            if components.len() > 1 {
                merge_components_by_mahalanobis(&mut components, threshold, self.max_components);
            }
        }

        if components.len() > self.max_components {
            components.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            components.truncate(self.max_components);
        }

        let mut reduced =
            MultiComponentState::from_components(surface, components.into_iter().collect());
        reduced.normalize_weights();
        reduced
    }
}

/// Keep the `max_components` highest-weight components and renormalize
pub fn reduce(state: MultiComponentState, max_components: usize) -> MultiComponentState {
    Reduction::prune(max_components).apply(state)
}

/// Moment-matched merge of two components
fn merge_pair(a: &Component, b: &Component) -> Component {
    let w = a.weight + b.weight;
    let (wa, wb) = if w > NUMERICAL_ZERO {
        (a.weight / w, b.weight / w)
    } else {
        (0.5, 0.5)
    };

    // b expressed next to a so phi does not jump across the boundary
    let diff = parameter_difference(&b.parameters, &a.parameters);
    let mut mean = &a.parameters + &diff * wb;
    mean[PHI] = wrap_angle(mean[PHI]);

    let covariance = match (&a.covariance, &b.covariance) {
        (Some(pa), Some(pb)) => {
            // Spread correction: wa * wb * (xa - xb)(xa - xb)ᵀ
            let spread = &diff * diff.transpose() * (wa * wb);
            Some(symmetrize(&(pa * wa + pb * wb + spread)))
        }
        _ => None,
    };

    Component {
        weight: w,
        parameters: mean,
        covariance,
    }
}

/// Merge mixture components using Mahalanobis distance.
///
/// 1. Find the pair with minimum Mahalanobis distance, measured with the
///    covariance of the heavier component
/// 2. Merge it into a single component preserving probability mass
/// 3. Repeat until all distances exceed the threshold and the mixture is
///    within `max_components`
pub fn merge_components_by_mahalanobis(
    components: &mut Vec<Component>,
    merge_threshold: f64,
    max_components: usize,
) {
    while components.len() > 1 {
        let mut min_dist = f64::INFINITY;
        let mut merge_at = (0, 1);

        for i in 0..components.len() {
            for j in (i + 1)..components.len() {
                let (ci, cj) = (&components[i], &components[j]);
                let heavier = if ci.weight >= cj.weight { ci } else { cj };
                let Some(sigma) = &heavier.covariance else {
                    continue;
                };
                let diff = parameter_difference(&cj.parameters, &ci.parameters);
                let dist = mahalanobis_distance(&diff, &DVector::zeros(diff.len()), sigma);
                if dist < min_dist {
                    min_dist = dist;
                    merge_at = (i, j);
                }
            }
        }

        // Past the cap we keep merging regardless of distance
        if min_dist > merge_threshold && components.len() <= max_components {
            break;
        }

        let (i, j) = merge_at;
        let merged = merge_pair(&components[i], &components[j]);
        components.remove(j);
        components[i] = merged;
    }
}

// ============================================================================
// Combination
// ============================================================================

/// Product of two Gaussians describing the same surface
///
/// Returns the combined component and its log weight, or `None` if
/// `Pa + Pb` is singular.
fn combine_pair(
    a: &Component,
    pa: &DMatrix<f64>,
    b: &Component,
    pb: &DMatrix<f64>,
) -> Option<Result<(Component, f64), GsfError>> {
    let sum = pa + pb;
    let sum_inv = sum.clone().cholesky()?.inverse();

    let diff = parameter_difference(&b.parameters, &a.parameters);
    let gain = pa * &sum_inv;
    let mut parameters = &a.parameters + &gain * &diff;
    parameters[PHI] = wrap_angle(parameters[PHI]);

    // Pa (Pa + Pb)⁻¹ Pb
    let raw = pa - &gain * pa;
    let covariance = if is_positive_semi_definite(&raw) {
        raw
    } else {
        match regularize_covariance(&raw) {
            Some(fixed) => fixed,
            None => {
                return Some(Err(GsfError::CombinerFailed {
                    description: "combined covariance is not positive semi-definite".to_string(),
                }))
            }
        }
    };

    let log_weight =
        a.weight.ln() + b.weight.ln() + log_gaussian_pdf(&diff, &DVector::zeros(diff.len()), &sum);

    Some(Ok((Component::new(1.0, parameters, covariance), log_weight)))
}

/// Combine a forward mixture with a smoother mixture on the same surface
///
/// Every pair `(a, b)` of the cross product `|A| x |B|` contributes the
/// product Gaussian with weight `w_a w_b N(x_b - x_a; 0, P_a + P_b)`. The
/// result is renormalized and pruned back to `max_components`.
///
/// If the forward mixture carries no covariances the smoother mixture is
/// returned unchanged.
///
/// # Errors
/// * `EmptyMixture` if either input is empty
/// * `CombinerFailed` if a combined covariance cannot be made PSD, the
///   smoother mixture lacks covariances, or every pair is degenerate
pub fn combine(
    forward: &MultiComponentState,
    smoother: &MultiComponentState,
    max_components: usize,
) -> Result<MultiComponentState, GsfError> {
    combine_with(forward, smoother, &Reduction::prune(max_components))
}

/// [`combine`] with an explicit reduction policy
pub fn combine_with(
    forward: &MultiComponentState,
    smoother: &MultiComponentState,
    reduction: &Reduction,
) -> Result<MultiComponentState, GsfError> {
    if forward.is_empty() || smoother.is_empty() {
        return Err(GsfError::EmptyMixture);
    }
    if !forward.all_have_covariance() {
        return Ok(smoother.clone());
    }
    if !smoother.all_have_covariance() {
        return Err(GsfError::CombinerFailed {
            description: "smoother mixture has components without covariance".to_string(),
        });
    }

    let mut combined: Vec<Component> = Vec::with_capacity(forward.len() * smoother.len());
    let mut log_weights: Vec<f64> = Vec::with_capacity(forward.len() * smoother.len());

    for a in forward.iter() {
        for b in smoother.iter() {
            let (Some(pa), Some(pb)) = (&a.covariance, &b.covariance) else {
                continue;
            };
            if let Some(result) = combine_pair(a, pa, b, pb) {
                let (component, log_weight) = result?;
                combined.push(component);
                log_weights.push(log_weight);
            }
        }
    }

    let weights = normalize_log_weights(&log_weights);
    let components: ComponentVec = combined
        .into_iter()
        .zip(weights)
        .filter(|(_, w)| *w > 0.0)
        .map(|(mut c, w)| {
            c.weight = w;
            c
        })
        .collect();

    if components.is_empty() {
        return Err(GsfError::CombinerFailed {
            description: "no compatible component pair between forward and smoother mixtures"
                .to_string(),
        });
    }

    Ok(reduction.apply(MultiComponentState::from_components(
        *smoother.surface(),
        components,
    )))
}

/// Collapse and re-wrap as a single-component mixture
pub fn collapse_to_mixture(state: &MultiComponentState) -> Result<MultiComponentState, GsfError> {
    collapse_to_single(state).map(|p| p.to_mixture())
}
