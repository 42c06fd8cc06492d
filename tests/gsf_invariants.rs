//! Structural properties that hold for every fit

#[allow(dead_code)]
#[path = "gsf/helpers/mod.rs"]
mod helpers;

use std::sync::Arc;
use std::thread;

use gsf::components::Reduction;
use gsf::toy::{ExtrapolationCache, StraightLineExtrapolator, ToyTrackGenerator};
use gsf::{
    DebugReporter, FitRequest, GaussianSumFitter, GsfConfig, MultiStateExtrapolator,
    ParticleHypothesis, PropDirection, TrackFitter, TrackStateType,
};
use helpers::assertions::{assert_dmatrix_close, assert_dvector_close, assert_mixture_valid};
use helpers::scenarios::{brems_fitter, fitter, generator, telescope};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_every_mixture_is_normalized_and_psd() {
    init_logging();
    let geometry = telescope().with_material(0.02).with_calorimeter(600.0);
    let extrapolator = StraightLineExtrapolator::new(geometry.clone())
        .with_bremsstrahlung(gsf::toy::BremsstrahlungModel::three_branch());
    let fitter = GaussianSumFitter::new(
        extrapolator,
        GsfConfig::default()
            .with_max_components(6)
            .with_forward_combination(true),
    )
    .unwrap();

    for seed in 0..5 {
        let track = ToyTrackGenerator::new(geometry.clone(), seed)
            .with_outlier(3, 50.0)
            .generate();
        let request = FitRequest::measurements(track.seed, track.measurements)
            .with_calorimeter(track.calorimeter.unwrap());

        let mut reporter = DebugReporter::new();
        let result = fitter.fit_with_reporter(&request, &mut reporter).unwrap();

        for (index, node) in reporter.forward_steps() {
            let mixture = node.mixture().unwrap();
            assert!(mixture.len() <= 6);
            assert_mixture_valid(mixture, &format!("track {} forward node {}", seed, index));
        }
        for (index, node) in result.trajectory.iter().enumerate() {
            let mixture = node.mixture().unwrap();
            assert!(mixture.len() <= 6);
            assert_mixture_valid(mixture, &format!("track {} smoothed node {}", seed, index));
        }
    }
}

#[test]
fn test_trajectory_runs_outwards_from_perigee() {
    let fitter = fitter(GsfConfig::default());
    let geometry = telescope();
    let track = generator(30).with_outlier(2, 50.0).generate();
    let result = fitter
        .fit_measurements(track.seed, track.measurements)
        .unwrap();

    let z: Vec<f64> = result
        .trajectory
        .iter()
        .map(|node| geometry.z_of(&node.surface().unwrap()).unwrap())
        .collect();
    assert_eq!(z[0], 0.0);
    assert!(z.windows(2).all(|w| w[0] < w[1]), "z not increasing: {:?}", z);
}

#[test]
fn test_smoothed_nodes_share_forward_measurements() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(31).generate();
    let mut reporter = DebugReporter::new();
    let result = fitter
        .fit_with_reporter(
            &FitRequest::measurements(track.seed, track.measurements),
            &mut reporter,
        )
        .unwrap();

    let forward = reporter.forward_steps();
    assert_eq!(forward.len() + 1, result.trajectory.len());
    for ((_, forward_node), smoothed_node) in forward.iter().zip(result.trajectory.iter().skip(1))
    {
        assert!(Arc::ptr_eq(
            forward_node.measurement().unwrap(),
            smoothed_node.measurement().unwrap()
        ));
    }
    assert_eq!(reporter.smoothed_nodes().len(), 8);
    assert_eq!(reporter.perigees().len(), 1);
    assert_eq!(reporter.completed_fits().len(), 1);
}

#[test]
fn test_outlier_carries_prediction_unchanged() {
    let fitter = brems_fitter(4);
    let config = fitter.config().clone();
    let track = generator(32).with_outlier(4, 50.0).generate();

    let mut reporter = DebugReporter::new();
    fitter
        .fit_with_reporter(
            &FitRequest::measurements(track.seed, track.measurements),
            &mut reporter,
        )
        .unwrap();

    let steps = reporter.forward_steps();
    let (_, outlier) = &steps[4];
    let (_, next) = &steps[5];
    assert!(outlier.is(TrackStateType::Outlier));

    // Propagating the outlier's prediction must give the next prediction
    let mut cache = ExtrapolationCache::default();
    let expected = fitter
        .extrapolator()
        .extrapolate(
            &mut cache,
            outlier.mixture().unwrap(),
            &telescope().detector(5),
            PropDirection::AlongMomentum,
            ParticleHypothesis::Electron,
        )
        .unwrap();
    let expected = Reduction::from_config(&config).apply(expected);
    let actual = next.mixture().unwrap();

    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(actual.iter()) {
        assert!((e.weight - a.weight).abs() < 1e-12);
        assert_dvector_close(&a.parameters, &e.parameters, 1e-12, "parameters");
        assert_dmatrix_close(
            a.covariance.as_ref().unwrap(),
            e.covariance.as_ref().unwrap(),
            1e-12,
            "covariance",
        );
    }
}

#[test]
fn test_concurrent_fits_are_independent() {
    let fitter = fitter(GsfConfig::default());
    let requests: Vec<FitRequest> = (40..44)
        .map(|seed| {
            let track = generator(seed).generate();
            FitRequest::measurements(track.seed, track.measurements)
        })
        .collect();
    let sequential: Vec<_> = requests.iter().map(|r| fitter.fit(r).unwrap()).collect();

    let shared = &fitter;
    let parallel: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|request| scope.spawn(move || shared.fit(request).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (s, p) in sequential.iter().zip(&parallel) {
        assert_eq!(s.perigee, p.perigee);
        assert_eq!(s.fit_quality, p.fit_quality);
    }
    let stats = fitter.statistics();
    assert_eq!(stats.measurement_fits, 8);
    assert_eq!(stats.successful_fits, 8);
    assert_eq!(stats.failed_fits, 0);
}

#[test]
fn test_fit_does_not_consume_request() {
    let fitter = fitter(GsfConfig::default());
    let track = generator(50).generate();
    let request = FitRequest::measurements(track.seed, track.measurements);

    let a = fitter.fit(&request).unwrap();
    let b = fitter.fit(&request).unwrap();
    assert_eq!(a.perigee, b.perigee);
    assert_eq!(request.source.len(), 8);
}
