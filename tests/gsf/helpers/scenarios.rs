//! Toy scenario builders

use gsf::gsf::traits::MultiStateExtrapolator;
use gsf::toy::{
    BremsstrahlungModel, ExtrapolationCache, StraightLineExtrapolator, TelescopeGeometry,
    ToyTrackGenerator,
};
use gsf::{
    GaussianSumFitter, GsfConfig, GsfError, MultiComponentState, ParticleHypothesis,
    PropDirection, Surface, TrackParam,
};

/// Eight planes at z = 50..400 mm
pub fn telescope() -> TelescopeGeometry {
    TelescopeGeometry::uniform(8, 50.0, 50.0)
}

pub fn fitter(config: GsfConfig) -> GaussianSumFitter<StraightLineExtrapolator> {
    GaussianSumFitter::new(StraightLineExtrapolator::new(telescope()), config)
        .expect("valid configuration")
}

pub fn generator(seed: u64) -> ToyTrackGenerator {
    ToyTrackGenerator::new(telescope(), seed)
}

/// Telescope with material and three-branch energy loss for electrons
pub fn brems_fitter(max_components: usize) -> GaussianSumFitter<StraightLineExtrapolator> {
    let extrapolator = StraightLineExtrapolator::new(telescope().with_material(0.02))
        .with_bremsstrahlung(BremsstrahlungModel::three_branch());
    GaussianSumFitter::new(
        extrapolator,
        GsfConfig::default().with_max_components(max_components),
    )
    .expect("valid configuration")
}

/// Extrapolator that cannot go against the momentum
pub struct ForwardOnly(pub StraightLineExtrapolator);

impl MultiStateExtrapolator for ForwardOnly {
    type Cache = ExtrapolationCache;

    fn extrapolate(
        &self,
        cache: &mut Self::Cache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        if direction == PropDirection::OppositeMomentum {
            return Err(GsfError::ExtrapolationFailed {
                surface: target.id(),
                description: "backward propagation disabled".to_string(),
            });
        }
        self.0.extrapolate(cache, state, target, direction, particle)
    }

    fn extrapolate_directly(
        &self,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        self.extrapolate(&mut ExtrapolationCache::default(), state, target, direction, particle)
    }
}

/// Extrapolator that cannot reach the perigee from the detector
pub struct NoPerigee(pub StraightLineExtrapolator);

impl MultiStateExtrapolator for NoPerigee {
    type Cache = ExtrapolationCache;

    fn extrapolate(
        &self,
        cache: &mut Self::Cache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        if *target == Surface::perigee() {
            return Err(GsfError::ExtrapolationFailed {
                surface: target.id(),
                description: "perigee unreachable".to_string(),
            });
        }
        self.0.extrapolate(cache, state, target, direction, particle)
    }

    fn extrapolate_directly(
        &self,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        self.extrapolate(&mut ExtrapolationCache::default(), state, target, direction, particle)
    }
}

/// Extrapolator that overwrites `qOverP` with a fixed value at the perigee
pub struct PerigeeMomentum(pub StraightLineExtrapolator, pub f64);

impl MultiStateExtrapolator for PerigeeMomentum {
    type Cache = ExtrapolationCache;

    fn extrapolate(
        &self,
        cache: &mut Self::Cache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        let extrapolated = self.0.extrapolate(cache, state, target, direction, particle)?;
        if *target != Surface::perigee() {
            return Ok(extrapolated);
        }
        let mut result = MultiComponentState::new(*target);
        for mut component in extrapolated.into_components() {
            component.parameters[TrackParam::QOverP.index()] = self.1;
            result.push(component);
        }
        Ok(result)
    }

    fn extrapolate_directly(
        &self,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        self.extrapolate(&mut ExtrapolationCache::default(), state, target, direction, particle)
    }
}
