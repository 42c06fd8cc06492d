//! Forward filter
//!
//! Walks the ordered measurements from the seed outwards. At every surface
//! the running mixture is extrapolated, capped, updated and passed through
//! the outlier policy. Each node stores the *predicted* mixture so that the
//! smoother can later combine with it; the carried state is the updated
//! mixture, or the prediction again for outliers.

use std::sync::Arc;

use super::config::GsfConfig;
use super::errors::GsfError;
use super::traits::{HitCalibrator, MultiStateExtrapolator};
use super::types::{
    Measurement, MultiComponentState, ParticleHypothesis, PropDirection, RawHit,
    StateOnSurface, Surface, TrackParameters, TrackStateType, Trajectory,
};
use crate::components::combiner::{collapse_to_single, Reduction};
use crate::components::outlier::recorded_fit_quality;
use crate::components::updator::update;
use crate::reporter::FitReporter;

/// Forward pass over one track
pub struct ForwardFilter<'a, E: MultiStateExtrapolator> {
    extrapolator: &'a E,
    reduction: Reduction,
    outlier_cutoff: f64,
    particle: ParticleHypothesis,
}

impl<'a, E: MultiStateExtrapolator> ForwardFilter<'a, E> {
    pub fn new(extrapolator: &'a E, config: &GsfConfig, particle: ParticleHypothesis) -> Self {
        Self {
            extrapolator,
            reduction: Reduction::from_config(config),
            outlier_cutoff: config.chi_squared_outlier_cutoff,
            particle,
        }
    }

    /// Seed mixture: seed parameters only, the seed covariance is not used
    fn seed_state(seed: &TrackParameters) -> MultiComponentState {
        MultiComponentState::single(seed.surface, seed.parameters.clone(), None)
    }

    /// Extrapolate along momentum and enforce the component cap
    fn predict(
        &self,
        cache: &mut E::Cache,
        state: &MultiComponentState,
        target: &Surface,
    ) -> Result<MultiComponentState, GsfError> {
        let predicted = self.extrapolator.extrapolate(
            cache,
            state,
            target,
            PropDirection::AlongMomentum,
            self.particle,
        )?;
        if predicted.is_empty() {
            return Err(GsfError::ExtrapolationFailed {
                surface: target.id(),
                description: "extrapolator returned an empty mixture".to_string(),
            });
        }
        Ok(self.reduction.apply(predicted))
    }

    /// Update, outlier decision and node construction for one surface
    ///
    /// Returns the node and the mixture carried to the next surface.
    fn filter_step<R: FitReporter + ?Sized>(
        &self,
        index: usize,
        predicted: MultiComponentState,
        measurement: Arc<Measurement>,
        reporter: &mut R,
    ) -> Result<(StateOnSurface, MultiComponentState), GsfError> {
        let (updated, fit_quality) = update(&predicted, &measurement)?;
        let (recorded, rejected) = recorded_fit_quality(fit_quality, self.outlier_cutoff);

        let (state_type, carried) = if rejected {
            log::debug!(
                "forward node {}: outlier on surface {} (chi2 = {:.2}, ndof = {})",
                index,
                measurement.surface().id().0,
                fit_quality.chi_squared(),
                fit_quality.ndof()
            );
            reporter.on_outlier(index, measurement.surface(), &fit_quality);
            (TrackStateType::Outlier, predicted.clone())
        } else {
            (TrackStateType::Measurement, updated)
        };

        let node = StateOnSurface::new(recorded, Some(measurement), None, Some(predicted), state_type);
        reporter.on_forward_step(index, &node);
        Ok((node, carried))
    }

    /// Filter calibrated measurements
    ///
    /// # Arguments
    /// * `cache` - Per-fit extrapolation cache
    /// * `seed` - Seed parameters; only the parameter vector is used
    /// * `measurements` - Measurements ordered along the path
    /// * `reporter` - Observability hooks
    ///
    /// # Errors
    /// * `EmptyInput` if there are no measurements
    /// * `ExtrapolationFailed` / `UpdateFailed` abort the pass
    pub fn run<R: FitReporter + ?Sized>(
        &self,
        cache: &mut E::Cache,
        seed: &TrackParameters,
        measurements: &[Arc<Measurement>],
        reporter: &mut R,
    ) -> Result<Trajectory, GsfError> {
        if measurements.is_empty() {
            return Err(GsfError::EmptyInput {
                description: "no measurements to fit".to_string(),
            });
        }

        let mut trajectory = Trajectory::with_capacity(measurements.len());
        let mut state = Self::seed_state(seed);

        for (index, measurement) in measurements.iter().enumerate() {
            let predicted = self.predict(cache, &state, measurement.surface())?;
            let (node, carried) = self.filter_step(index, predicted, Arc::clone(measurement), reporter)?;
            trajectory.push(node);
            state = carried;
        }

        Ok(trajectory)
    }

    /// Filter raw hits, calibrating each against the collapsed prediction
    ///
    /// Hits without a surface are skipped with a warning.
    ///
    /// # Errors
    /// * `EmptyInput` if no hit yields a node
    /// * `UpdateFailed` if the calibrator rejects a hit
    /// * `ExtrapolationFailed` / `UpdateFailed` from the step abort the pass
    pub fn run_raw_hits<R: FitReporter + ?Sized>(
        &self,
        cache: &mut E::Cache,
        seed: &TrackParameters,
        hits: &[Arc<RawHit>],
        calibrator: &dyn HitCalibrator,
        reporter: &mut R,
    ) -> Result<Trajectory, GsfError> {
        let mut trajectory = Trajectory::with_capacity(hits.len());
        let mut state = Self::seed_state(seed);

        for hit in hits {
            let Some(surface) = hit.surface else {
                log::warn!(
                    "raw hit on detector {} has no surface, skipped",
                    hit.detector_id.0
                );
                continue;
            };

            let predicted = self.predict(cache, &state, &surface)?;
            let collapsed = collapse_to_single(&predicted)?;

            let Some(measurement) = calibrator.correct(hit, &collapsed) else {
                log::warn!(
                    "{} could not calibrate hit on detector {}",
                    calibrator.name(),
                    hit.detector_id.0
                );
                return Err(GsfError::UpdateFailed {
                    description: format!(
                        "no measurement to update with on surface {}",
                        surface.id().0
                    ),
                });
            };
            let measurement = if measurement.raw_hit().is_some() {
                measurement
            } else {
                measurement.with_raw_hit(Arc::clone(hit))
            };

            let index = trajectory.len();
            let (node, carried) = self.filter_step(index, predicted, Arc::new(measurement), reporter)?;
            trajectory.push(node);
            state = carried;
        }

        if trajectory.is_empty() {
            return Err(GsfError::EmptyInput {
                description: format!("none of the {} raw hits could be used", hits.len()),
            });
        }
        Ok(trajectory)
    }
}

