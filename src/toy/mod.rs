//! Reference collaborators for tests, examples and benchmarks
//!
//! A telescope of parallel planes along `z`, a straight-line extrapolator
//! with optional multiple scattering and bremsstrahlung-like branching, a
//! simple hit calibrator and a seeded track generator.
//!
//! Track parameters on a plane are `[x, y, phi, theta, qOverP]` with `x`
//! and `y` the local coordinates, `theta` measured from the `z` axis and
//! `qOverP` in 1/GeV. The perigee surface is the plane `z = 0`.

pub mod calibrator;
pub mod extrapolator;
pub mod generator;
pub mod geometry;

pub use calibrator::PlanarCalibrator;
pub use extrapolator::{BremsstrahlungModel, ExtrapolationCache, StraightLineExtrapolator};
pub use generator::{ToyTrack, ToyTrackGenerator};
pub use geometry::TelescopeGeometry;
