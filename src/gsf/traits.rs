//! Collaborator contracts
//!
//! The fitter depends on two external capabilities: moving a mixture from
//! one surface to another through material, and calibrating raw hits. Both
//! are expressed as traits so detector-specific code stays outside the core.
//! [`TrackFitter`] is the interface the fitter itself offers to callers.

use super::errors::GsfError;
use super::fitter::{FitRequest, FitResult};
use super::types::{
    Measurement, MultiComponentState, ParticleHypothesis, PropDirection, RawHit, Surface,
    TrackParameters,
};

/// Multi-component extrapolation engine
///
/// Propagates every component of a mixture to a target surface, applying
/// material effects. The returned mixture may have more (or fewer)
/// components than the input, e.g. when bremsstrahlung branching splits a
/// component.
///
/// # Cache
/// [`Cache`](Self::Cache) holds material-effects bookkeeping that may be
/// reused between the steps of one fit. The fitter creates a fresh cache
/// per fit and never shares it between fits.
pub trait MultiStateExtrapolator: Send + Sync {
    /// Per-fit scratch state
    type Cache: Default + Send;

    /// Extrapolate with cache reuse
    ///
    /// # Arguments
    /// * `cache` - Per-fit cache
    /// * `state` - Mixture on its current surface
    /// * `target` - Destination surface
    /// * `direction` - Propagation direction relative to the momentum
    /// * `particle` - Particle hypothesis for material effects
    ///
    /// # Returns
    /// The mixture on `target`, or `ExtrapolationFailed` if the surface
    /// cannot be reached
    fn extrapolate(
        &self,
        cache: &mut Self::Cache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError>;

    /// One-off extrapolation without cache reuse (detours such as the
    /// calorimeter constraint)
    fn extrapolate_directly(
        &self,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError>;

    /// Get extrapolator name
    fn name(&self) -> &'static str {
        "extrapolator"
    }
}

/// Raw hit calibration
///
/// Builds a calibrated measurement from a raw hit given the collapsed
/// predicted track state on the hit's surface.
pub trait HitCalibrator: Send + Sync {
    /// Calibrate `hit`; `None` if no measurement can be built
    fn correct(&self, hit: &RawHit, predicted: &TrackParameters) -> Option<Measurement>;

    /// Get calibrator name
    fn name(&self) -> &'static str {
        "calibrator"
    }
}

/// Common interface for track fitters
///
/// A fitter is stateless between calls apart from its configuration and
/// usage counters, so it can be shared between threads.
pub trait TrackFitter {
    /// Fit one track
    ///
    /// # Returns
    /// The smoothed trajectory (innermost node first, perigee node included),
    /// the perigee parameters and the aggregated fit quality
    fn fit(&self, request: &FitRequest) -> Result<FitResult, GsfError>;

    /// Refit a previous result, seeded from its perigee
    fn refit(
        &self,
        previous: &FitResult,
        particle: ParticleHypothesis,
    ) -> Result<FitResult, GsfError>;

    /// Get fitter name
    fn name(&self) -> &'static str;
}
