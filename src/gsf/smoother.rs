//! Backward smoother and perigee determination
//!
//! The smoother walks the forward trajectory from the outermost measurement
//! back to the innermost one. It builds new nodes and never touches the
//! forward nodes. The running backward state only ever contains backward
//! information; the optional combination with the forward prediction is
//! recorded on the node and not carried on.
//!
//! Nodes are appended in backward order. The caller appends the perigee
//! node and reverses the trajectory.

use std::sync::Arc;

use super::config::GsfConfig;
use super::errors::GsfError;
use super::traits::MultiStateExtrapolator;
use super::types::{
    FitQuality, Measurement, MultiComponentState, ParticleHypothesis, PropDirection,
    StateOnSurface, Surface, TrackParam, TrackParameters, TrackStateType, Trajectory,
    N_TRACK_PARAMS,
};
use super::MAX_PERIGEE_Q_OVER_P;
use crate::components::combiner::{collapse_to_single, combine_with, Reduction};
use crate::components::updator::{fit_quality, update};
use crate::reporter::FitReporter;

/// Variance of the pseudo-measurement left behind by the calorimeter detour.
const CALO_PSEUDO_VARIANCE: f64 = 1e6;

/// Index of the forward node after which the calorimeter constraint is applied
const CALO_NODE_INDEX: usize = 1;

/// Backward pass over one forward trajectory
pub struct Smoother<'a, E: MultiStateExtrapolator> {
    extrapolator: &'a E,
    reduction: Reduction,
    combine_with_forward: bool,
    covariance_scale: [f64; N_TRACK_PARAMS],
    particle: ParticleHypothesis,
}

impl<'a, E: MultiStateExtrapolator> Smoother<'a, E> {
    pub fn new(extrapolator: &'a E, config: &GsfConfig, particle: ParticleHypothesis) -> Self {
        Self {
            extrapolator,
            reduction: Reduction::from_config(config),
            combine_with_forward: config.combine_with_forward,
            covariance_scale: config.smoother_covariance_scale,
            particle,
        }
    }

    /// Smooth a forward trajectory
    ///
    /// # Arguments
    /// * `cache` - Per-fit extrapolation cache
    /// * `forward` - Forward trajectory, innermost node first
    /// * `calorimeter` - Optional energy constraint applied after the
    ///   second-innermost node
    /// * `reporter` - Observability hooks
    ///
    /// # Returns
    /// Smoothed nodes in backward order (innermost node last)
    ///
    /// # Errors
    /// `SmoothingFailed`, with the underlying error as cause where there is
    /// one
    pub fn run<R: FitReporter + ?Sized>(
        &self,
        cache: &mut E::Cache,
        forward: &Trajectory,
        calorimeter: Option<&Arc<Measurement>>,
        reporter: &mut R,
    ) -> Result<Trajectory, GsfError> {
        let nodes = forward.nodes();
        let Some(last) = nodes.iter().rposition(|n| n.is(TrackStateType::Measurement)) else {
            return Err(GsfError::SmoothingFailed {
                description: "forward trajectory has no measurement node".to_string(),
                cause: None,
            });
        };

        let mut smoothed = Trajectory::with_capacity(nodes.len() + 3);

        // Trailing non-measurement nodes are carried over as they are
        for node in nodes[last + 1..].iter().rev() {
            smoothed.push(node.clone());
            reporter.on_smoothed_node(node);
        }

        let mut backward = self.seed(&nodes[last], &mut smoothed, reporter)?;

        for index in (0..last).rev() {
            let node = &nodes[index];
            let target = node.surface().ok_or_else(|| GsfError::SmoothingFailed {
                description: format!("forward node {} has no surface", index),
                cause: None,
            })?;

            let extrapolated = self
                .extrapolator
                .extrapolate(
                    cache,
                    &backward,
                    &target,
                    PropDirection::OppositeMomentum,
                    self.particle,
                )
                .map_err(|e| {
                    GsfError::smoothing(
                        format!("reverse extrapolation to surface {}", target.id().0),
                        e,
                    )
                })?;
            if extrapolated.is_empty() {
                return Err(GsfError::smoothing(
                    format!("reverse extrapolation to surface {}", target.id().0),
                    GsfError::EmptyMixture,
                ));
            }
            let extrapolated = self.reduction.apply(extrapolated);

            backward = match node.state_type() {
                TrackStateType::Measurement => {
                    let (new_node, updated) = self.smooth_measurement(index, node, extrapolated)?;
                    reporter.on_smoothed_node(&new_node);
                    smoothed.push(new_node);
                    if index == CALO_NODE_INDEX {
                        self.apply_calorimeter(updated, calorimeter, &mut smoothed, reporter)
                    } else {
                        updated
                    }
                }
                TrackStateType::Outlier => {
                    let new_node = StateOnSurface::new(
                        FitQuality::nominal(),
                        node.measurement().cloned(),
                        None,
                        Some(extrapolated.clone()),
                        TrackStateType::Outlier,
                    );
                    reporter.on_smoothed_node(&new_node);
                    smoothed.push(new_node);
                    extrapolated
                }
                other => {
                    let new_node = StateOnSurface::new(
                        node.fit_quality(),
                        node.measurement().cloned(),
                        None,
                        Some(extrapolated.clone()),
                        other,
                    );
                    reporter.on_smoothed_node(&new_node);
                    smoothed.push(new_node);
                    extrapolated
                }
            };
        }

        Ok(smoothed)
    }

    /// Seed the backward recursion at the outermost measurement
    ///
    /// The node's own prediction is updated with its own measurement and
    /// recorded. The backward state is that update with a weakened
    /// covariance, updated once more with the same measurement.
    fn seed<R: FitReporter + ?Sized>(
        &self,
        node: &StateOnSurface,
        smoothed: &mut Trajectory,
        reporter: &mut R,
    ) -> Result<MultiComponentState, GsfError> {
        let (measurement, predicted) = match (node.measurement(), node.mixture()) {
            (Some(m), Some(p)) => (m, p),
            _ => {
                return Err(GsfError::SmoothingFailed {
                    description: "outermost measurement node lacks a measurement or prediction"
                        .to_string(),
                    cause: None,
                })
            }
        };

        let (updated, fq) = update(predicted, measurement)
            .map_err(|e| GsfError::smoothing("update at the outermost measurement", e))?;
        if !updated.all_have_covariance() {
            return Err(GsfError::SmoothingFailed {
                description: "outermost smoothed state has no covariance".to_string(),
                cause: None,
            });
        }
        let collapsed = collapse_to_single(&updated)
            .map_err(|e| GsfError::smoothing("collapse at the outermost measurement", e))?;

        let seed_node = StateOnSurface::new(
            fq,
            Some(Arc::clone(measurement)),
            Some(collapsed),
            Some(updated.clone()),
            TrackStateType::Measurement,
        );
        reporter.on_smoothed_node(&seed_node);
        smoothed.push(seed_node);

        let weakened = updated.with_scaled_covariance(&self.covariance_scale);
        let (backward, _) = update(&weakened, measurement)
            .map_err(|e| GsfError::smoothing("update of the weakened smoother seed", e))?;
        Ok(backward)
    }

    /// Update one measurement node on the way back
    ///
    /// Returns the new node and the backward-only state to carry on.
    fn smooth_measurement(
        &self,
        index: usize,
        node: &StateOnSurface,
        extrapolated: MultiComponentState,
    ) -> Result<(StateOnSurface, MultiComponentState), GsfError> {
        let measurement = node.measurement().ok_or_else(|| GsfError::SmoothingFailed {
            description: format!("measurement node {} has no measurement", index),
            cause: None,
        })?;

        let (updated, fq) = update(&extrapolated, measurement)
            .map_err(|e| GsfError::smoothing(format!("update at node {}", index), e))?;

        let (recorded, fq) = match (self.combine_with_forward, node.mixture()) {
            (true, Some(forward)) => {
                let combined = combine_with(forward, &updated, &self.reduction).map_err(|e| {
                    GsfError::smoothing(format!("forward combination at node {}", index), e)
                })?;
                let fq = fit_quality(&combined, measurement).map_err(|e| {
                    GsfError::smoothing(format!("fit quality of combined node {}", index), e)
                })?;
                (combined, fq)
            }
            _ => (updated.clone(), fq),
        };

        // Only the innermost node carries a single collapsed estimate
        let parameters = if index == 0 {
            Some(collapse_to_single(&recorded).map_err(|e| {
                GsfError::smoothing("collapse at the innermost measurement", e)
            })?)
        } else {
            None
        };

        let new_node = StateOnSurface::new(
            fq,
            Some(Arc::clone(measurement)),
            parameters,
            Some(recorded),
            TrackStateType::Measurement,
        );
        Ok((new_node, updated))
    }

    /// Run the calorimeter detour if a constraint was supplied
    ///
    /// Only follows an accepted measurement at [`CALO_NODE_INDEX`]. The
    /// sweep continues from the full mixture brought back from the
    /// calorimeter. Any failure leaves the backward state untouched.
    fn apply_calorimeter<R: FitReporter + ?Sized>(
        &self,
        backward: MultiComponentState,
        calorimeter: Option<&Arc<Measurement>>,
        smoothed: &mut Trajectory,
        reporter: &mut R,
    ) -> MultiComponentState {
        let Some(calorimeter) = calorimeter else {
            return backward;
        };
        match self.calorimeter_constraint(&backward, calorimeter) {
            Ok((calo_node, pseudo_node, constrained)) => {
                reporter.on_smoothed_node(&calo_node);
                smoothed.push(calo_node);
                reporter.on_smoothed_node(&pseudo_node);
                smoothed.push(pseudo_node);
                constrained
            }
            Err(e) => {
                log::debug!("calorimeter constraint skipped: {}", e);
                backward
            }
        }
    }

    fn calorimeter_constraint(
        &self,
        state: &MultiComponentState,
        calorimeter: &Arc<Measurement>,
    ) -> Result<(StateOnSurface, StateOnSurface, MultiComponentState), GsfError> {
        let origin: Surface = *state.surface();

        let at_calo = self.extrapolator.extrapolate_directly(
            state,
            calorimeter.surface(),
            PropDirection::AlongMomentum,
            ParticleHypothesis::NonInteracting,
        )?;
        let (updated, fq) = update(&at_calo, calorimeter)?;
        let calo_node = StateOnSurface::new(
            fq,
            Some(Arc::clone(calorimeter)),
            None,
            Some(updated.clone()),
            TrackStateType::Measurement,
        );

        let returned = self.extrapolator.extrapolate_directly(
            &updated,
            &origin,
            PropDirection::OppositeMomentum,
            ParticleHypothesis::NonInteracting,
        )?;
        let collapsed = collapse_to_single(&returned)?;
        let constrained = self.reduction.apply(returned.clone());

        let pseudo = Measurement::pseudo(origin, TrackParam::Loc1, 0.0, CALO_PSEUDO_VARIANCE);
        let pseudo_node = StateOnSurface::new(
            FitQuality::default(),
            Some(Arc::new(pseudo)),
            Some(collapsed),
            Some(returned),
            TrackStateType::Other,
        );

        Ok((calo_node, pseudo_node, constrained))
    }

    /// Extrapolate the innermost smoothed state to the perigee and collapse
    ///
    /// # Errors
    /// `PerigeeFailed` if the extrapolation or the collapse fails, or the
    /// collapsed `qOverP` is non-finite or exceeds [`MAX_PERIGEE_Q_OVER_P`]
    pub fn perigee(
        &self,
        cache: &mut E::Cache,
        innermost: &MultiComponentState,
    ) -> Result<(StateOnSurface, TrackParameters), GsfError> {
        let target = Surface::perigee();
        let at_perigee = self
            .extrapolator
            .extrapolate(
                cache,
                innermost,
                &target,
                PropDirection::OppositeMomentum,
                self.particle,
            )
            .map_err(|e| GsfError::PerigeeFailed {
                description: format!("extrapolation to the perigee failed: {}", e),
            })?;
        if at_perigee.is_empty() {
            return Err(GsfError::PerigeeFailed {
                description: "extrapolation to the perigee returned no components".to_string(),
            });
        }

        let reduced = self.reduction.apply(at_perigee);
        let collapsed = collapse_to_single(&reduced).map_err(|e| GsfError::PerigeeFailed {
            description: format!("collapse at the perigee failed: {}", e),
        })?;

        let q_over_p = collapsed.q_over_p();
        if !q_over_p.is_finite() || q_over_p.abs() > MAX_PERIGEE_Q_OVER_P {
            return Err(GsfError::PerigeeFailed {
                description: format!("degenerate perigee qOverP {}", q_over_p),
            });
        }

        let node = StateOnSurface::new(
            FitQuality::default(),
            None,
            Some(collapsed.clone()),
            Some(reduced),
            TrackStateType::Perigee,
        );
        Ok((node, collapsed))
    }
}
