/*!
Gaussian Sum Filter track fitting.

The fit runs in three passes over an ordered set of measurements:
- forward filtering with a Gaussian mixture state
- backward smoothing, seeded from the last measurement
- perigee determination and fit-quality aggregation

The entry point is [`GaussianSumFitter`].
*/

pub mod config;
pub mod errors;
pub mod fit_quality;
pub mod fitter;
pub mod forward;
pub mod smoother;
pub mod traits;
pub mod types;

/// Weights and totals at or below this value are treated as zero.
pub const NUMERICAL_ZERO: f64 = 1e-15;

/// Number of free fit parameters, subtracted from the aggregated ndof.
pub const NUMBER_OF_FIT_PARAMETERS: f64 = 5.0;

/// Largest accepted `|qOverP|` of the collapsed perigee state.
pub const MAX_PERIGEE_Q_OVER_P: f64 = 1e8;

pub use config::{GsfConfig, MAX_STATE_COMPONENTS};
pub use errors::GsfError;
pub use fit_quality::aggregate;
pub use fitter::{FitRequest, FitResult, FitStatistics, GaussianSumFitter, MeasurementSource};
pub use traits::{HitCalibrator, MultiStateExtrapolator, TrackFitter};
pub use types::{
    Component, ComponentVec, DetectorId, FitQuality, Measurement, MeasurementKind,
    MultiComponentState, ParticleHypothesis, PropDirection, RawHit, StateOnSurface, Surface,
    SurfaceId, SurfaceKind, TrackParam, TrackParameters, TrackStateType, Trajectory,
    N_TRACK_PARAMS,
};
