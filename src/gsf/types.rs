//! Track states, mixtures, measurements and trajectory nodes
//!
//! Uses runtime dimensions (DVector/DMatrix) throughout; track parameters are
//! always [`N_TRACK_PARAMS`]-vectors `[loc1, loc2, phi, theta, qOverP]`.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::common::linalg::scale_covariance;

use super::errors::GsfError;

/// Number of free track parameters.
pub const N_TRACK_PARAMS: usize = 5;

/// Inline capacity of a mixture before it spills to the heap.
pub const INLINE_COMPONENTS: usize = 8;

/// Component storage of a [`MultiComponentState`].
pub type ComponentVec = SmallVec<[Component; INLINE_COMPONENTS]>;

/// Index into the track parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackParam {
    /// First local coordinate on the surface
    Loc1,
    /// Second local coordinate on the surface
    Loc2,
    /// Azimuthal angle of the momentum
    Phi,
    /// Polar angle of the momentum
    Theta,
    /// Charge over momentum
    QOverP,
}

impl TrackParam {
    /// All parameters in vector order.
    pub const ALL: [TrackParam; N_TRACK_PARAMS] = [
        TrackParam::Loc1,
        TrackParam::Loc2,
        TrackParam::Phi,
        TrackParam::Theta,
        TrackParam::QOverP,
    ];

    /// Position of this parameter in the track parameter vector
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            TrackParam::Loc1 => 0,
            TrackParam::Loc2 => 1,
            TrackParam::Phi => 2,
            TrackParam::Theta => 3,
            TrackParam::QOverP => 4,
        }
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Opaque surface identifier, interpreted only by the extrapolator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

impl SurfaceId {
    /// Identifier reserved for the perigee reference surface
    pub const PERIGEE: SurfaceId = SurfaceId(u32::MAX);
}

/// What a surface represents to the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Sensitive detector surface carrying measurements
    Detector,
    /// Reference surface for the perigee parametrisation
    Perigee,
    /// Calorimeter surface used by the optional energy constraint
    Calorimeter,
}

/// Handle to a surface of the detector geometry.
///
/// The core never looks at geometry: surfaces are compared by identity and
/// handed to the extrapolator as targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    id: SurfaceId,
    kind: SurfaceKind,
}

impl Surface {
    /// Detector surface with the given identifier
    pub fn detector(id: u32) -> Self {
        Self {
            id: SurfaceId(id),
            kind: SurfaceKind::Detector,
        }
    }

    /// Calorimeter surface with the given identifier
    pub fn calorimeter(id: u32) -> Self {
        Self {
            id: SurfaceId(id),
            kind: SurfaceKind::Calorimeter,
        }
    }

    /// The perigee reference surface
    pub fn perigee() -> Self {
        Self {
            id: SurfaceId::PERIGEE,
            kind: SurfaceKind::Perigee,
        }
    }

    #[inline]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }
}

/// Propagation direction relative to the particle momentum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropDirection {
    AlongMomentum,
    OppositeMomentum,
}

/// Particle hypothesis handed through to the extrapolator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticleHypothesis {
    #[default]
    Electron,
    Muon,
    Pion,
    /// No material interactions at all
    NonInteracting,
}

// ============================================================================
// Gaussian components and mixtures
// ============================================================================

/// One weighted Gaussian hypothesis of the track state.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Mixture weight, finite and non-negative
    pub weight: f64,
    /// Track parameters `[loc1, loc2, phi, theta, qOverP]`
    pub parameters: DVector<f64>,
    /// Covariance, or `None` when the component carries no error estimate
    pub covariance: Option<DMatrix<f64>>,
}

impl Component {
    /// Create a new component with a covariance
    pub fn new(weight: f64, parameters: DVector<f64>, covariance: DMatrix<f64>) -> Self {
        Self {
            weight,
            parameters,
            covariance: Some(covariance),
        }
    }

    /// Create a component without covariance (e.g. a seed)
    pub fn without_covariance(weight: f64, parameters: DVector<f64>) -> Self {
        Self {
            weight,
            parameters,
            covariance: None,
        }
    }

    #[inline]
    pub fn has_covariance(&self) -> bool {
        self.covariance.is_some()
    }
}

/// Weighted collection of Gaussian components on one surface.
///
/// A valid mixture is non-empty and its weights sum to one. Operations that
/// change the weights renormalize before handing the mixture on.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiComponentState {
    surface: Surface,
    components: ComponentVec,
}

impl MultiComponentState {
    /// Create an empty mixture on a surface
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            components: SmallVec::new(),
        }
    }

    /// Create a mixture from components
    pub fn from_components(surface: Surface, components: ComponentVec) -> Self {
        Self {
            surface,
            components,
        }
    }

    /// Single-component mixture with weight one
    pub fn single(
        surface: Surface,
        parameters: DVector<f64>,
        covariance: Option<DMatrix<f64>>,
    ) -> Self {
        let mut components = SmallVec::new();
        components.push(Component {
            weight: 1.0,
            parameters,
            covariance,
        });
        Self {
            surface,
            components,
        }
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn into_components(self) -> ComponentVec {
        self.components
    }

    /// Sum of all component weights
    pub fn total_weight(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    /// Normalize weights to sum to one.
    ///
    /// Leaves the weights untouched if the total is not positive.
    pub fn normalize_weights(&mut self) {
        let total = self.total_weight();
        if total > super::NUMERICAL_ZERO && total.is_finite() {
            for comp in self.components.iter_mut() {
                comp.weight /= total;
            }
        }
    }

    /// Whether `|Σw - 1| < tolerance`
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        !self.is_empty() && (self.total_weight() - 1.0).abs() < tolerance
    }

    /// Whether every component carries a covariance
    pub fn all_have_covariance(&self) -> bool {
        self.components.iter().all(Component::has_covariance)
    }

    /// Highest-weight component
    pub fn dominant(&self) -> Option<&Component> {
        self.components
            .iter()
            .max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Copy of this mixture with every covariance scaled by per-parameter
    /// variance factors (see [`scale_covariance`]).
    pub fn with_scaled_covariance(&self, factors: &[f64; N_TRACK_PARAMS]) -> Self {
        let components = self
            .components
            .iter()
            .map(|c| Component {
                weight: c.weight,
                parameters: c.parameters.clone(),
                covariance: c.covariance.as_ref().map(|cov| scale_covariance(cov, factors)),
            })
            .collect();
        Self {
            surface: self.surface,
            components,
        }
    }
}

/// Single-Gaussian track parameters on a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackParameters {
    pub parameters: DVector<f64>,
    pub covariance: Option<DMatrix<f64>>,
    pub surface: Surface,
}

impl TrackParameters {
    /// Create track parameters, checking dimensions
    pub fn new(
        parameters: DVector<f64>,
        covariance: Option<DMatrix<f64>>,
        surface: Surface,
    ) -> Result<Self, GsfError> {
        if parameters.len() != N_TRACK_PARAMS {
            return Err(GsfError::DimensionMismatch {
                expected: N_TRACK_PARAMS,
                actual: parameters.len(),
                context: "track parameters".to_string(),
            });
        }
        if let Some(cov) = &covariance {
            if cov.nrows() != N_TRACK_PARAMS || cov.ncols() != N_TRACK_PARAMS {
                return Err(GsfError::DimensionMismatch {
                    expected: N_TRACK_PARAMS,
                    actual: cov.nrows(),
                    context: "track parameter covariance".to_string(),
                });
            }
        }
        Ok(Self {
            parameters,
            covariance,
            surface,
        })
    }

    #[inline]
    pub fn get(&self, param: TrackParam) -> f64 {
        self.parameters[param.index()]
    }

    #[inline]
    pub fn q_over_p(&self) -> f64 {
        self.get(TrackParam::QOverP)
    }

    /// Standard deviation of one parameter, if a covariance is present
    pub fn error(&self, param: TrackParam) -> Option<f64> {
        self.covariance
            .as_ref()
            .map(|cov| cov[(param.index(), param.index())].sqrt())
    }

    /// Wrap into a single-component mixture
    pub fn to_mixture(&self) -> MultiComponentState {
        MultiComponentState::single(self.surface, self.parameters.clone(), self.covariance.clone())
    }
}

// ============================================================================
// Measurements
// ============================================================================

/// Identifier of the detector element that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectorId(pub u64);

/// Kind of measurement, used only to decide what a refit keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementKind {
    /// Calibrated detector hit
    Hit,
    /// Synthetic soft constraint
    Pseudo,
    /// Calorimeter energy constraint
    CaloCluster,
}

/// Uncalibrated detector hit.
///
/// A [`HitCalibrator`](super::traits::HitCalibrator) turns it into a
/// [`Measurement`] using the predicted track state.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub detector_id: DetectorId,
    /// Surface of the detector element, `None` if the hit has lost its element link
    pub surface: Option<Surface>,
    /// Nominal local position
    pub local_position: DVector<f64>,
    /// Nominal local covariance
    pub local_covariance: DMatrix<f64>,
    /// Measured track parameters, in the order of `local_position`
    pub measured: SmallVec<[TrackParam; 2]>,
}

/// Immutable calibrated measurement.
///
/// Exposes only `(local parameters, local covariance, surface)` plus the
/// subset of track parameters it constrains.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    parameters: DVector<f64>,
    covariance: DMatrix<f64>,
    measured: SmallVec<[TrackParam; 2]>,
    surface: Surface,
    kind: MeasurementKind,
    detector_id: Option<DetectorId>,
    raw_hit: Option<Arc<RawHit>>,
}

impl Measurement {
    /// Create a measurement of the given track parameters
    pub fn new(
        parameters: DVector<f64>,
        covariance: DMatrix<f64>,
        measured: &[TrackParam],
        surface: Surface,
    ) -> Result<Self, GsfError> {
        let dim = measured.len();
        if dim == 0 || dim > N_TRACK_PARAMS {
            return Err(GsfError::DimensionMismatch {
                expected: 2,
                actual: dim,
                context: "measured parameter set".to_string(),
            });
        }
        if parameters.len() != dim {
            return Err(GsfError::DimensionMismatch {
                expected: dim,
                actual: parameters.len(),
                context: "measurement parameters".to_string(),
            });
        }
        if covariance.nrows() != dim || covariance.ncols() != dim {
            return Err(GsfError::DimensionMismatch {
                expected: dim,
                actual: covariance.nrows(),
                context: "measurement covariance".to_string(),
            });
        }
        Ok(Self {
            parameters,
            covariance,
            measured: measured.iter().copied().collect(),
            surface,
            kind: MeasurementKind::Hit,
            detector_id: None,
            raw_hit: None,
        })
    }

    /// Two-dimensional position measurement with uncorrelated errors
    pub fn position_2d(surface: Surface, loc1: f64, loc2: f64, sigma1: f64, sigma2: f64) -> Self {
        Self {
            parameters: DVector::from_vec(vec![loc1, loc2]),
            covariance: DMatrix::from_diagonal(&DVector::from_vec(vec![
                sigma1 * sigma1,
                sigma2 * sigma2,
            ])),
            measured: SmallVec::from_slice(&[TrackParam::Loc1, TrackParam::Loc2]),
            surface,
            kind: MeasurementKind::Hit,
            detector_id: None,
            raw_hit: None,
        }
    }

    /// One-dimensional strip measurement of `loc1`
    pub fn strip(surface: Surface, loc1: f64, sigma: f64) -> Self {
        Self {
            parameters: DVector::from_vec(vec![loc1]),
            covariance: DMatrix::from_vec(1, 1, vec![sigma * sigma]),
            measured: SmallVec::from_slice(&[TrackParam::Loc1]),
            surface,
            kind: MeasurementKind::Hit,
            detector_id: None,
            raw_hit: None,
        }
    }

    /// Soft constraint on one parameter with a (usually huge) variance
    pub fn pseudo(surface: Surface, param: TrackParam, value: f64, variance: f64) -> Self {
        Self {
            parameters: DVector::from_vec(vec![value]),
            covariance: DMatrix::from_vec(1, 1, vec![variance]),
            measured: SmallVec::from_slice(&[param]),
            surface,
            kind: MeasurementKind::Pseudo,
            detector_id: None,
            raw_hit: None,
        }
    }

    /// Calorimeter constraint on `qOverP`
    pub fn calo_cluster(surface: Surface, q_over_p: f64, sigma: f64) -> Self {
        Self {
            parameters: DVector::from_vec(vec![q_over_p]),
            covariance: DMatrix::from_vec(1, 1, vec![sigma * sigma]),
            measured: SmallVec::from_slice(&[TrackParam::QOverP]),
            surface,
            kind: MeasurementKind::CaloCluster,
            detector_id: None,
            raw_hit: None,
        }
    }

    pub fn with_detector_id(mut self, id: DetectorId) -> Self {
        self.detector_id = Some(id);
        self
    }

    /// Attach the raw hit this measurement was calibrated from
    pub fn with_raw_hit(mut self, hit: Arc<RawHit>) -> Self {
        self.detector_id = Some(hit.detector_id);
        self.raw_hit = Some(hit);
        self
    }

    #[inline]
    pub fn parameters(&self) -> &DVector<f64> {
        &self.parameters
    }

    #[inline]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    #[inline]
    pub fn detector_id(&self) -> Option<DetectorId> {
        self.detector_id
    }

    pub fn raw_hit(&self) -> Option<&Arc<RawHit>> {
        self.raw_hit.as_ref()
    }

    pub fn measured(&self) -> &[TrackParam] {
        &self.measured
    }

    /// Local dimensionality (1 or 2 for detector hits)
    #[inline]
    pub fn dim(&self) -> usize {
        self.measured.len()
    }

    /// Projection matrix `H` from track parameters to measurement space
    pub fn projection(&self) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(self.dim(), N_TRACK_PARAMS);
        for (row, param) in self.measured.iter().enumerate() {
            h[(row, param.index())] = 1.0;
        }
        h
    }
}

// ============================================================================
// Fit quality and trajectory nodes
// ============================================================================

/// χ² and (possibly fractional) number of degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitQuality {
    chi_squared: f64,
    ndof: f64,
}

impl FitQuality {
    pub fn new(chi_squared: f64, ndof: f64) -> Self {
        Self { chi_squared, ndof }
    }

    /// Placeholder stored on outlier nodes
    pub fn nominal() -> Self {
        Self::new(1.0, 1.0)
    }

    #[inline]
    pub fn chi_squared(&self) -> f64 {
        self.chi_squared
    }

    #[inline]
    pub fn ndof(&self) -> f64 {
        self.ndof
    }

    /// χ²/ndof, `None` when ndof is not positive
    pub fn chi_squared_per_ndof(&self) -> Option<f64> {
        (self.ndof > 0.0).then(|| self.chi_squared / self.ndof)
    }
}

/// Role of a node in a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStateType {
    Measurement,
    Outlier,
    Perigee,
    /// Scatterers, pseudo-measurement helpers and anything else
    Other,
}

/// One trajectory node. Never mutated once it is part of a trajectory.
#[derive(Debug, Clone)]
pub struct StateOnSurface {
    fit_quality: FitQuality,
    measurement: Option<Arc<Measurement>>,
    parameters: Option<TrackParameters>,
    mixture: Option<MultiComponentState>,
    state_type: TrackStateType,
}

impl StateOnSurface {
    pub fn new(
        fit_quality: FitQuality,
        measurement: Option<Arc<Measurement>>,
        parameters: Option<TrackParameters>,
        mixture: Option<MultiComponentState>,
        state_type: TrackStateType,
    ) -> Self {
        Self {
            fit_quality,
            measurement,
            parameters,
            mixture,
            state_type,
        }
    }

    #[inline]
    pub fn fit_quality(&self) -> FitQuality {
        self.fit_quality
    }

    pub fn measurement(&self) -> Option<&Arc<Measurement>> {
        self.measurement.as_ref()
    }

    /// Single best estimate, present on collapsed nodes only
    pub fn parameters(&self) -> Option<&TrackParameters> {
        self.parameters.as_ref()
    }

    pub fn mixture(&self) -> Option<&MultiComponentState> {
        self.mixture.as_ref()
    }

    #[inline]
    pub fn state_type(&self) -> TrackStateType {
        self.state_type
    }

    #[inline]
    pub fn is(&self, state_type: TrackStateType) -> bool {
        self.state_type == state_type
    }

    /// Surface of the node: the measurement's, else the mixture's or the parameters'
    pub fn surface(&self) -> Option<Surface> {
        self.measurement
            .as_ref()
            .map(|m| *m.surface())
            .or_else(|| self.mixture.as_ref().map(|m| *m.surface()))
            .or_else(|| self.parameters.as_ref().map(|p| p.surface))
    }
}

/// Ordered, exclusively owned sequence of trajectory nodes.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    nodes: Vec<StateOnSurface>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Append a node; nodes are only ever appended, read or moved
    pub fn push(&mut self, node: StateOnSurface) {
        self.nodes.push(node);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateOnSurface> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[StateOnSurface] {
        &self.nodes
    }

    pub fn first(&self) -> Option<&StateOnSurface> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&StateOnSurface> {
        self.nodes.last()
    }

    pub fn get(&self, index: usize) -> Option<&StateOnSurface> {
        self.nodes.get(index)
    }

    pub fn reverse(&mut self) {
        self.nodes.reverse();
    }

    /// Number of nodes of a given type
    pub fn count(&self, state_type: TrackStateType) -> usize {
        self.nodes.iter().filter(|n| n.is(state_type)).count()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a StateOnSurface;
    type IntoIter = std::slice::Iter<'a, StateOnSurface>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
