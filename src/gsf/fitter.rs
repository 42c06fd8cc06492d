//! Gaussian Sum fitter orchestration
//!
//! Runs forward filter, smoother, perigee determination and fit-quality
//! aggregation for one track. The fitter holds only its configuration,
//! collaborators and append-only usage counters; every fit gets a fresh
//! extrapolation cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::config::GsfConfig;
use super::errors::GsfError;
use super::fit_quality::aggregate;
use super::forward::ForwardFilter;
use super::smoother::Smoother;
use super::traits::{HitCalibrator, MultiStateExtrapolator, TrackFitter};
use super::types::{
    FitQuality, Measurement, MeasurementKind, ParticleHypothesis, RawHit, TrackParameters,
    TrackStateType, Trajectory, N_TRACK_PARAMS,
};
use crate::reporter::{FitReporter, NoOpReporter};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

// ============================================================================
// Requests and results
// ============================================================================

/// What the forward filter consumes
#[derive(Debug, Clone)]
pub enum MeasurementSource {
    /// Calibrated measurements, ordered along the path
    Measurements(Vec<Arc<Measurement>>),
    /// Raw hits calibrated on the fly, ordered along the path
    RawHits(Vec<Arc<RawHit>>),
}

impl MeasurementSource {
    pub fn len(&self) -> usize {
        match self {
            MeasurementSource::Measurements(m) => m.len(),
            MeasurementSource::RawHits(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input of one fit
#[derive(Debug, Clone)]
pub struct FitRequest {
    /// Seed parameters; the seed covariance is not used
    pub seed: TrackParameters,
    pub source: MeasurementSource,
    pub particle: ParticleHypothesis,
    /// Optional calorimeter energy constraint
    pub calorimeter: Option<Arc<Measurement>>,
}

impl FitRequest {
    /// Fit calibrated measurements with the default particle hypothesis
    pub fn measurements(seed: TrackParameters, measurements: Vec<Measurement>) -> Self {
        Self {
            seed,
            source: MeasurementSource::Measurements(
                measurements.into_iter().map(Arc::new).collect(),
            ),
            particle: ParticleHypothesis::default(),
            calorimeter: None,
        }
    }

    /// Fit raw hits with the default particle hypothesis
    pub fn raw_hits(seed: TrackParameters, hits: Vec<RawHit>) -> Self {
        Self {
            seed,
            source: MeasurementSource::RawHits(hits.into_iter().map(Arc::new).collect()),
            particle: ParticleHypothesis::default(),
            calorimeter: None,
        }
    }

    pub fn with_particle(mut self, particle: ParticleHypothesis) -> Self {
        self.particle = particle;
        self
    }

    pub fn with_calorimeter(mut self, calorimeter: Measurement) -> Self {
        self.calorimeter = Some(Arc::new(calorimeter));
        self
    }
}

/// Output of a successful fit
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Smoothed trajectory, perigee node first
    pub trajectory: Trajectory,
    /// Collapsed perigee parameters
    pub perigee: TrackParameters,
    /// Aggregated fit quality
    pub fit_quality: FitQuality,
}

impl FitResult {
    /// Number of nodes used as measurements
    pub fn number_of_measurements(&self) -> usize {
        self.trajectory.count(TrackStateType::Measurement)
    }

    pub fn number_of_outliers(&self) -> usize {
        self.trajectory.count(TrackStateType::Outlier)
    }
}

// ============================================================================
// Usage counters
// ============================================================================

/// Snapshot of the fitter's usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FitStatistics {
    /// Fits started from calibrated measurements
    pub measurement_fits: u64,
    /// Fits started from raw hits
    pub raw_hit_fits: u64,
    /// Fits that produced a result
    pub successful_fits: u64,
    /// Fits that ended with an error
    pub failed_fits: u64,
}

impl FitStatistics {
    pub fn total_fits(&self) -> u64 {
        self.measurement_fits + self.raw_hit_fits
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Default)]
struct FitCounters {
    measurement_fits: AtomicU64,
    raw_hit_fits: AtomicU64,
    successful_fits: AtomicU64,
    failed_fits: AtomicU64,
}

impl FitCounters {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FitStatistics {
        FitStatistics {
            measurement_fits: self.measurement_fits.load(Ordering::Relaxed),
            raw_hit_fits: self.raw_hit_fits.load(Ordering::Relaxed),
            successful_fits: self.successful_fits.load(Ordering::Relaxed),
            failed_fits: self.failed_fits.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// GaussianSumFitter
// ============================================================================

/// Gaussian Sum Filter track fitter
///
/// # Example
///
/// ```
/// use gsf::gsf::{FitRequest, GaussianSumFitter, GsfConfig, TrackFitter};
/// use gsf::toy::{StraightLineExtrapolator, TelescopeGeometry, ToyTrackGenerator};
///
/// let geometry = TelescopeGeometry::uniform(8, 50.0, 50.0);
/// let extrapolator = StraightLineExtrapolator::new(geometry.clone());
/// let fitter = GaussianSumFitter::new(extrapolator, GsfConfig::default()).unwrap();
///
/// let track = ToyTrackGenerator::new(geometry, 42).generate();
/// let result = fitter.fit(&FitRequest::measurements(track.seed, track.measurements)).unwrap();
/// assert_eq!(result.number_of_measurements(), 8);
/// ```
pub struct GaussianSumFitter<E: MultiStateExtrapolator> {
    extrapolator: E,
    config: GsfConfig,
    calibrator: Option<Box<dyn HitCalibrator>>,
    counters: FitCounters,
}

impl<E: MultiStateExtrapolator> GaussianSumFitter<E> {
    /// Create a fitter, validating the configuration
    pub fn new(extrapolator: E, config: GsfConfig) -> Result<Self, GsfError> {
        config.validate()?;
        log::debug!(
            "GSF configured: {} extrapolator, max {} components, cutoff {}, combine {}",
            extrapolator.name(),
            config.maximum_number_of_components,
            config.chi_squared_outlier_cutoff,
            config.combine_with_forward
        );
        Ok(Self {
            extrapolator,
            config,
            calibrator: None,
            counters: FitCounters::default(),
        })
    }

    /// Attach a raw-hit calibrator
    pub fn with_calibrator(mut self, calibrator: Box<dyn HitCalibrator>) -> Self {
        self.calibrator = Some(calibrator);
        self
    }

    pub fn config(&self) -> &GsfConfig {
        &self.config
    }

    pub fn extrapolator(&self) -> &E {
        &self.extrapolator
    }

    /// Snapshot of the usage counters
    pub fn statistics(&self) -> FitStatistics {
        self.counters.snapshot()
    }

    /// Log the usage counters at info level
    pub fn log_summary(&self) {
        let stats = self.statistics();
        log::info!(
            "GSF summary: {} measurement fits, {} raw-hit fits, {} successful, {} failed",
            stats.measurement_fits,
            stats.raw_hit_fits,
            stats.successful_fits,
            stats.failed_fits
        );
    }

    /// Fit calibrated measurements ordered along the path
    pub fn fit_measurements(
        &self,
        seed: TrackParameters,
        measurements: Vec<Measurement>,
    ) -> Result<FitResult, GsfError> {
        self.fit(&FitRequest::measurements(seed, measurements))
    }

    /// Fit raw hits ordered along the path
    pub fn fit_raw_hits(
        &self,
        seed: TrackParameters,
        hits: Vec<RawHit>,
    ) -> Result<FitResult, GsfError> {
        self.fit(&FitRequest::raw_hits(seed, hits))
    }

    /// Fit with observability hooks
    pub fn fit_with_reporter<R: FitReporter + ?Sized>(
        &self,
        request: &FitRequest,
        reporter: &mut R,
    ) -> Result<FitResult, GsfError> {
        match &request.source {
            MeasurementSource::Measurements(_) => FitCounters::inc(&self.counters.measurement_fits),
            MeasurementSource::RawHits(_) => FitCounters::inc(&self.counters.raw_hit_fits),
        }

        match self.run(request, reporter) {
            Ok(result) => {
                FitCounters::inc(&self.counters.successful_fits);
                reporter.on_fit_complete(&result.fit_quality);
                Ok(result)
            }
            Err(e) => {
                FitCounters::inc(&self.counters.failed_fits);
                log::warn!("GSF fit failed: {}", e);
                Err(e)
            }
        }
    }

    fn run<R: FitReporter + ?Sized>(
        &self,
        request: &FitRequest,
        reporter: &mut R,
    ) -> Result<FitResult, GsfError> {
        if request.source.is_empty() {
            return Err(GsfError::EmptyInput {
                description: "fit request has no measurements".to_string(),
            });
        }
        if request.seed.parameters.len() != N_TRACK_PARAMS {
            return Err(GsfError::DimensionMismatch {
                expected: N_TRACK_PARAMS,
                actual: request.seed.parameters.len(),
                context: "seed parameters".to_string(),
            });
        }

        let mut cache = E::Cache::default();
        let forward_filter = ForwardFilter::new(&self.extrapolator, &self.config, request.particle);

        let forward = match &request.source {
            MeasurementSource::Measurements(measurements) => {
                forward_filter.run(&mut cache, &request.seed, measurements, reporter)?
            }
            MeasurementSource::RawHits(hits) => {
                if self.config.refit_on_measurements {
                    return Err(GsfError::Configuration {
                        description: "raw-hit fit requested while refit_on_measurements is set"
                            .to_string(),
                    });
                }
                let calibrator =
                    self.calibrator
                        .as_deref()
                        .ok_or_else(|| GsfError::Configuration {
                            description: "raw-hit fit requested without a hit calibrator"
                                .to_string(),
                        })?;
                forward_filter.run_raw_hits(&mut cache, &request.seed, hits, calibrator, reporter)?
            }
        };
        log::debug!(
            "forward pass: {} nodes, {} outliers",
            forward.len(),
            forward.count(TrackStateType::Outlier)
        );

        let smoother = Smoother::new(&self.extrapolator, &self.config, request.particle);
        let mut trajectory =
            smoother.run(&mut cache, &forward, request.calorimeter.as_ref(), reporter)?;

        let innermost = trajectory
            .last()
            .and_then(|node| node.mixture())
            .ok_or_else(|| GsfError::SmoothingFailed {
                description: "smoothed trajectory has no innermost state".to_string(),
                cause: None,
            })?
            .clone();

        let (perigee_node, perigee) = smoother.perigee(&mut cache, &innermost)?;
        reporter.on_perigee(&perigee);
        trajectory.push(perigee_node);
        trajectory.reverse();

        let fit_quality = aggregate(&trajectory)?;

        Ok(FitResult {
            trajectory,
            perigee,
            fit_quality,
        })
    }

    /// Build the request for refitting a previous result
    ///
    /// Keeps measurement nodes (and outliers when `reintegrate_outliers` is
    /// set), drops pseudo-measurements and re-attaches a calorimeter
    /// constraint if the previous fit used one. Seeds from the perigee.
    pub fn refit_request(
        &self,
        previous: &FitResult,
        particle: ParticleHypothesis,
    ) -> Result<FitRequest, GsfError> {
        let mut measurements: Vec<Arc<Measurement>> = Vec::new();
        let mut calorimeter = None;

        for node in previous.trajectory.iter() {
            let keep = node.is(TrackStateType::Measurement)
                || (self.config.reintegrate_outliers && node.is(TrackStateType::Outlier));
            if !keep {
                continue;
            }
            let Some(measurement) = node.measurement() else {
                continue;
            };
            match measurement.kind() {
                MeasurementKind::Hit => measurements.push(Arc::clone(measurement)),
                MeasurementKind::CaloCluster => calorimeter = Some(Arc::clone(measurement)),
                MeasurementKind::Pseudo => {}
            }
        }

        let source = if self.config.refit_on_measurements {
            MeasurementSource::Measurements(measurements)
        } else {
            let hits: Vec<Arc<RawHit>> = measurements
                .iter()
                .filter_map(|m| {
                    let hit = m.raw_hit().cloned();
                    if hit.is_none() {
                        log::warn!("measurement without raw hit dropped from raw-hit refit");
                    }
                    hit
                })
                .collect();
            MeasurementSource::RawHits(hits)
        };

        if source.is_empty() {
            return Err(GsfError::EmptyInput {
                description: "previous fit has no usable measurements".to_string(),
            });
        }

        Ok(FitRequest {
            seed: previous.perigee.clone(),
            source,
            particle,
            calorimeter,
        })
    }

    /// Fit many independent tracks
    ///
    /// With the `rayon` feature the fits run in parallel; each fit still
    /// owns its own extrapolation cache.
    pub fn fit_batch(&self, requests: &[FitRequest]) -> Vec<Result<FitResult, GsfError>> {
        #[cfg(feature = "rayon")]
        {
            requests.par_iter().map(|request| self.fit(request)).collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            requests.iter().map(|request| self.fit(request)).collect()
        }
    }
}

impl<E: MultiStateExtrapolator> TrackFitter for GaussianSumFitter<E> {
    fn fit(&self, request: &FitRequest) -> Result<FitResult, GsfError> {
        self.fit_with_reporter(request, &mut NoOpReporter)
    }

    fn refit(
        &self,
        previous: &FitResult,
        particle: ParticleHypothesis,
    ) -> Result<FitResult, GsfError> {
        let request = self.refit_request(previous, particle)?;
        self.fit(&request)
    }

    fn name(&self) -> &'static str {
        "GaussianSumFitter"
    }
}
