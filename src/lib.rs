/*!
# gsf - Gaussian Sum Filter track fitting

Rust implementation of a Gaussian Sum Filter (GSF) track fitter for
charged-particle tracks, with the track state kept as a weighted mixture of
Gaussian components.

## Features

- Forward filtering with per-component Kalman updates and likelihood reweighting
- Backward smoothing with optional forward/backward mixture combination
- χ² outlier rejection, perigee determination and fit-quality aggregation
- Raw-hit fitting, refits and an optional calorimeter energy constraint
- Pluggable extrapolation and calibration through traits

## Modules

- [`gsf`] - Fitter, configuration, trajectory types and collaborator traits
- [`components`] - Shared algorithms: updator, combiner, outlier policy
- [`common`] - Low-level linear algebra
- [`reporter`] - Observability hooks
- [`toy`] - Telescope geometry, straight-line extrapolator and toy tracks

## Example

```rust
use gsf::{FitRequest, GaussianSumFitter, GsfConfig, TrackFitter};
use gsf::toy::{StraightLineExtrapolator, TelescopeGeometry, ToyTrackGenerator};

let geometry = TelescopeGeometry::uniform(8, 50.0, 50.0);
let fitter = GaussianSumFitter::new(
    StraightLineExtrapolator::new(geometry.clone()),
    GsfConfig::default(),
)
.unwrap();

let track = ToyTrackGenerator::new(geometry, 1).generate();
let result = fitter
    .fit(&FitRequest::measurements(track.seed, track.measurements))
    .unwrap();
println!("chi2/ndof = {:?}", result.fit_quality.chi_squared_per_ndof());
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Gaussian Sum fitter: orchestration, passes, types and traits
pub mod gsf;

/// Shared mixture algorithms (update, combination, outlier policy)
pub mod components;

/// Low-level utilities (linear algebra)
pub mod common;

/// Observability hooks
pub mod reporter;

/// Reference collaborators (telescope geometry, extrapolator, toy tracks)
pub mod toy;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Core types
pub use gsf::{
    Component, FitQuality, Measurement, MeasurementKind, MultiComponentState,
    ParticleHypothesis, PropDirection, RawHit, StateOnSurface, Surface, SurfaceId, TrackParam,
    TrackParameters, TrackStateType, Trajectory,
};

// Configuration and errors
pub use gsf::{GsfConfig, GsfError};

// Traits
pub use gsf::{HitCalibrator, MultiStateExtrapolator, TrackFitter};

// Fitter
pub use gsf::{FitRequest, FitResult, FitStatistics, GaussianSumFitter, MeasurementSource};

// Reporters
pub use reporter::{DebugReporter, FitReporter, LoggingReporter, NoOpReporter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
