//! Failure modes of a fit

#[allow(dead_code)]
#[path = "gsf/helpers/mod.rs"]
mod helpers;

use std::error::Error;

use gsf::toy::{PlanarCalibrator, StraightLineExtrapolator};
use gsf::{
    FitRequest, GaussianSumFitter, GsfConfig, GsfError, HitCalibrator, Measurement, RawHit,
    Surface, TrackFitter, TrackParameters,
};
use helpers::scenarios::{fitter, generator, telescope, ForwardOnly, NoPerigee, PerigeeMomentum};
use nalgebra::DVector;

/// Calibrates like [`PlanarCalibrator`] but refuses hits on one plane
struct RejectingCalibrator {
    plane: u32,
}

impl HitCalibrator for RejectingCalibrator {
    fn correct(&self, hit: &RawHit, predicted: &TrackParameters) -> Option<Measurement> {
        match hit.surface {
            Some(surface) if surface == Surface::detector(self.plane) => None,
            _ => PlanarCalibrator::default().correct(hit, predicted),
        }
    }
}

#[test]
fn test_empty_input() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(1).generate();
    let err = fitter.fit_measurements(track.seed, Vec::new()).unwrap_err();
    assert!(matches!(err, GsfError::EmptyInput { .. }));

    let stats = fitter.statistics();
    assert_eq!(stats.measurement_fits, 1);
    assert_eq!(stats.failed_fits, 1);
    assert_eq!(stats.successful_fits, 0);
}

#[test]
fn test_measurement_on_unknown_surface() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(2).generate();
    let mut measurements = track.measurements;
    measurements.push(Measurement::position_2d(Surface::detector(99), 0.0, 0.0, 0.01, 0.01));

    let err = fitter
        .fit_measurements(track.seed, measurements)
        .unwrap_err();
    assert!(
        matches!(err, GsfError::ExtrapolationFailed { surface, .. } if surface.0 == 99),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_measurements_in_wrong_order() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(3).generate();
    let mut measurements = track.measurements;
    measurements.reverse();

    let err = fitter
        .fit_measurements(track.seed, measurements)
        .unwrap_err();
    assert!(matches!(err, GsfError::ExtrapolationFailed { .. }));
}

#[test]
fn test_smoothing_failure_exposes_cause() {
    let extrapolator = ForwardOnly(StraightLineExtrapolator::new(telescope()));
    let fitter = GaussianSumFitter::new(extrapolator, GsfConfig::default()).unwrap();
    let track = generator(4).generate();

    let err = fitter
        .fit_measurements(track.seed, track.measurements)
        .unwrap_err();
    assert!(matches!(err, GsfError::SmoothingFailed { .. }));
    let cause = err.source().expect("smoothing failure should carry its cause");
    assert!(cause.to_string().contains("backward propagation disabled"));
}

#[test]
fn test_perigee_failure() {
    let extrapolator = NoPerigee(StraightLineExtrapolator::new(telescope()));
    let fitter = GaussianSumFitter::new(extrapolator, GsfConfig::default()).unwrap();
    let track = generator(5).generate();

    let err = fitter
        .fit_measurements(track.seed, track.measurements)
        .unwrap_err();
    assert!(matches!(err, GsfError::PerigeeFailed { .. }));
}

#[test]
fn test_degenerate_perigee_momentum() {
    for q_over_p in [1e9, -1e9, f64::NAN, f64::INFINITY] {
        let extrapolator = PerigeeMomentum(StraightLineExtrapolator::new(telescope()), q_over_p);
        let fitter = GaussianSumFitter::new(extrapolator, GsfConfig::default()).unwrap();
        let track = generator(5).generate();

        let err = fitter
            .fit_measurements(track.seed, track.measurements)
            .unwrap_err();
        assert!(
            matches!(err, GsfError::PerigeeFailed { .. }),
            "qOverP {}: unexpected error {}",
            q_over_p,
            err
        );
    }
}

#[test]
fn test_large_but_valid_perigee_momentum() {
    let extrapolator = PerigeeMomentum(StraightLineExtrapolator::new(telescope()), 1e7);
    let fitter = GaussianSumFitter::new(extrapolator, GsfConfig::default()).unwrap();
    let track = generator(5).generate();

    let result = fitter
        .fit_measurements(track.seed, track.measurements)
        .unwrap();
    assert_eq!(result.perigee.q_over_p(), 1e7);
}

#[test]
fn test_seed_with_wrong_dimension() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(5).generate();
    let seed = TrackParameters {
        parameters: DVector::from_vec(vec![0.0, 0.0, 0.25, 0.1]),
        covariance: None,
        surface: Surface::perigee(),
    };

    let err = fitter
        .fit_measurements(seed, track.measurements)
        .unwrap_err();
    assert!(
        matches!(
            err,
            GsfError::DimensionMismatch {
                expected: 5,
                actual: 4,
                ..
            }
        ),
        "unexpected error: {}",
        err
    );
    assert_eq!(fitter.statistics().failed_fits, 1);
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let extrapolator = StraightLineExtrapolator::new(telescope());
    let result = GaussianSumFitter::new(extrapolator, GsfConfig::default().with_max_components(0));
    assert!(matches!(result, Err(GsfError::Configuration { .. })));
}

#[test]
fn test_raw_hits_need_a_calibrator() {
    let fitter = fitter(GsfConfig::default().with_refit_on_measurements(false));
    let track = generator(6).generate();
    let err = fitter.fit_raw_hits(track.seed, track.raw_hits).unwrap_err();
    assert!(matches!(err, GsfError::Configuration { .. }));
    assert_eq!(fitter.statistics().raw_hit_fits, 1);
}

#[test]
fn test_raw_hits_rejected_when_refitting_on_measurements() {
    let fitter = fitter(GsfConfig::default())
        .with_calibrator(Box::new(PlanarCalibrator::default()));
    let track = generator(7).generate();
    let err = fitter.fit_raw_hits(track.seed, track.raw_hits).unwrap_err();
    assert!(matches!(err, GsfError::Configuration { .. }));
}

#[test]
fn test_raw_hits_without_surface_are_skipped() {
    let fitter = fitter(GsfConfig::default().with_refit_on_measurements(false))
        .with_calibrator(Box::new(PlanarCalibrator::default()));
    let track = generator(8).generate();

    let mut hits = track.raw_hits.clone();
    hits[3].surface = None;
    let result = fitter.fit_raw_hits(track.seed.clone(), hits).unwrap();
    assert_eq!(result.number_of_measurements(), 7);

    let orphans: Vec<_> = track
        .raw_hits
        .into_iter()
        .map(|mut h| {
            h.surface = None;
            h
        })
        .collect();
    let err = fitter.fit_raw_hits(track.seed, orphans).unwrap_err();
    assert!(matches!(err, GsfError::EmptyInput { .. }));
}

#[test]
fn test_rejected_calibration_aborts_fit() {
    let fitter = fitter(GsfConfig::default().with_refit_on_measurements(false))
        .with_calibrator(Box::new(RejectingCalibrator { plane: 3 }));
    let track = generator(8).generate();

    let err = fitter.fit_raw_hits(track.seed, track.raw_hits).unwrap_err();
    assert!(
        matches!(err, GsfError::UpdateFailed { ref description } if description.contains("surface 3")),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_refit_without_measurements() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(9).generate();
    let mut result = fitter
        .fit_measurements(track.seed, track.measurements)
        .unwrap();
    result.trajectory = gsf::Trajectory::new();

    let err = fitter
        .refit(&result, gsf::ParticleHypothesis::Electron)
        .unwrap_err();
    assert!(matches!(err, GsfError::EmptyInput { .. }));
}

#[test]
fn test_statistics_serialize() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(10).generate();
    fitter
        .fit(&FitRequest::measurements(track.seed.clone(), track.measurements))
        .unwrap();
    let _ = fitter.fit_measurements(track.seed, Vec::new());

    let json = fitter.statistics().to_json();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["successful_fits"], 1);
    assert_eq!(value["failed_fits"], 1);
    assert_eq!(fitter.statistics().total_fits(), 2);
    fitter.log_summary();
}
