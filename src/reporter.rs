//! Observability for Gaussian Sum fits.
//!
//! This module provides the [`FitReporter`] trait for debugging and research
//! instrumentation. Reporters receive callbacks at key points of a fit
//! without polluting the core algorithm logic.
//!
//! # Zero-Cost Abstraction
//!
//! The default [`NoOpReporter`] compiles to zero overhead - all callback
//! methods are empty and will be optimized away by the compiler.
//!
//! # Example
//!
//! ```
//! use gsf::reporter::{DebugReporter, FitReporter};
//! use gsf::gsf::FitQuality;
//!
//! let mut reporter = DebugReporter::new();
//! reporter.on_fit_complete(&FitQuality::new(3.2, 4.0));
//! assert_eq!(reporter.completed_fits().len(), 1);
//! ```

use crate::gsf::types::{FitQuality, StateOnSurface, Surface, TrackParameters};

// ============================================================================
// FitReporter Trait
// ============================================================================

/// Observability trait for fit execution.
///
/// All methods have default empty implementations, so you only need to
/// override the events you care about.
///
/// # Thread Safety
///
/// Reporters use `&mut self` for callbacks and are NOT required to be
/// `Send + Sync`; one reporter observes one fit.
pub trait FitReporter {
    /// Called after every forward-filter node is built.
    ///
    /// `index` is the position of the node in the forward trajectory.
    fn on_forward_step(&mut self, _index: usize, _node: &StateOnSurface) {}

    /// Called when an update is rejected.
    ///
    /// `rejected` is the fit quality of the discarded update, before it is
    /// replaced by the nominal placeholder.
    fn on_outlier(&mut self, _index: usize, _surface: &Surface, _rejected: &FitQuality) {}

    /// Called for every node the smoother appends, in backward order.
    fn on_smoothed_node(&mut self, _node: &StateOnSurface) {}

    /// Called once the perigee parameters are known.
    fn on_perigee(&mut self, _perigee: &TrackParameters) {}

    /// Called with the aggregated fit quality of a successful fit.
    fn on_fit_complete(&mut self, _fit_quality: &FitQuality) {}
}

// ============================================================================
// NoOpReporter
// ============================================================================

/// Zero-cost reporter that does nothing.
///
/// This is the reporter used when no observability is requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    /// Create a new no-op reporter.
    pub fn new() -> Self {
        Self
    }
}

impl FitReporter for NoOpReporter {
    // All methods use default empty implementations
}

// ============================================================================
// DebugReporter
// ============================================================================

/// Reporter that captures all events for debugging.
///
/// This reporter clones and stores all data passed to callbacks, allowing
/// post-hoc analysis of a fit.
///
/// # Memory Usage
///
/// Nodes carry whole mixtures. Keep one reporter per fit rather than
/// reusing it across many tracks.
#[derive(Debug, Clone, Default)]
pub struct DebugReporter {
    /// Captured forward nodes (index, node)
    forward_steps: Vec<(usize, StateOnSurface)>,

    /// Captured outlier decisions (index, surface, rejected fit quality)
    outliers: Vec<(usize, Surface, FitQuality)>,

    /// Captured smoothed nodes in backward order
    smoothed_nodes: Vec<StateOnSurface>,

    /// Captured perigee estimates
    perigees: Vec<TrackParameters>,

    /// Captured final fit qualities
    completed_fits: Vec<FitQuality>,
}

impl DebugReporter {
    /// Create a new debug reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all captured events.
    pub fn clear(&mut self) {
        self.forward_steps.clear();
        self.outliers.clear();
        self.smoothed_nodes.clear();
        self.perigees.clear();
        self.completed_fits.clear();
    }

    pub fn forward_steps(&self) -> &[(usize, StateOnSurface)] {
        &self.forward_steps
    }

    pub fn outliers(&self) -> &[(usize, Surface, FitQuality)] {
        &self.outliers
    }

    pub fn smoothed_nodes(&self) -> &[StateOnSurface] {
        &self.smoothed_nodes
    }

    pub fn perigees(&self) -> &[TrackParameters] {
        &self.perigees
    }

    pub fn completed_fits(&self) -> &[FitQuality] {
        &self.completed_fits
    }

    /// Total number of captured events across all types.
    pub fn total_events(&self) -> usize {
        self.forward_steps.len()
            + self.outliers.len()
            + self.smoothed_nodes.len()
            + self.perigees.len()
            + self.completed_fits.len()
    }
}

impl FitReporter for DebugReporter {
    fn on_forward_step(&mut self, index: usize, node: &StateOnSurface) {
        self.forward_steps.push((index, node.clone()));
    }

    fn on_outlier(&mut self, index: usize, surface: &Surface, rejected: &FitQuality) {
        self.outliers.push((index, *surface, *rejected));
    }

    fn on_smoothed_node(&mut self, node: &StateOnSurface) {
        self.smoothed_nodes.push(node.clone());
    }

    fn on_perigee(&mut self, perigee: &TrackParameters) {
        self.perigees.push(perigee.clone());
    }

    fn on_fit_complete(&mut self, fit_quality: &FitQuality) {
        self.completed_fits.push(*fit_quality);
    }
}

// ============================================================================
// LoggingReporter
// ============================================================================

/// Reporter that routes events to the `log` crate.
///
/// # Log Levels
///
/// - `on_fit_complete`: INFO
/// - `on_outlier`, `on_perigee`: DEBUG
/// - `on_forward_step`, `on_smoothed_node`: TRACE (only when verbose)
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter {
    /// Whether to log every trajectory node
    verbose: bool,
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Create a verbose logging reporter that also logs every node.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl FitReporter for LoggingReporter {
    fn on_forward_step(&mut self, index: usize, node: &StateOnSurface) {
        if self.verbose {
            log::trace!(
                "Forward node {}: type={:?}, chi2={:.3}, ndof={}, components={}",
                index,
                node.state_type(),
                node.fit_quality().chi_squared(),
                node.fit_quality().ndof(),
                node.mixture().map_or(0, |m| m.len())
            );
        }
    }

    fn on_outlier(&mut self, index: usize, surface: &Surface, rejected: &FitQuality) {
        log::debug!(
            "Outlier at node {} (surface {}): chi2={:.3}, ndof={}",
            index,
            surface.id().0,
            rejected.chi_squared(),
            rejected.ndof()
        );
    }

    fn on_smoothed_node(&mut self, node: &StateOnSurface) {
        if self.verbose {
            log::trace!(
                "Smoothed node: type={:?}, chi2={:.3}, collapsed={}",
                node.state_type(),
                node.fit_quality().chi_squared(),
                node.parameters().is_some()
            );
        }
    }

    fn on_perigee(&mut self, perigee: &TrackParameters) {
        log::debug!("Perigee: {:?}", perigee.parameters.as_slice());
    }

    fn on_fit_complete(&mut self, fit_quality: &FitQuality) {
        log::info!(
            "Fit complete: chi2={:.3}, ndof={}",
            fit_quality.chi_squared(),
            fit_quality.ndof()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gsf::types::TrackStateType;

    fn node() -> StateOnSurface {
        StateOnSurface::new(
            FitQuality::new(1.0, 2.0),
            None,
            None,
            None,
            TrackStateType::Other,
        )
    }

    #[test]
    fn test_noop_reporter() {
        let mut reporter = NoOpReporter::new();
        reporter.on_forward_step(0, &node());
        reporter.on_fit_complete(&FitQuality::default());
    }

    #[test]
    fn test_debug_reporter_captures_events() {
        let mut reporter = DebugReporter::new();
        reporter.on_forward_step(0, &node());
        reporter.on_forward_step(1, &node());
        reporter.on_outlier(1, &Surface::detector(2), &FitQuality::new(900.0, 2.0));
        reporter.on_smoothed_node(&node());
        reporter.on_fit_complete(&FitQuality::new(3.0, 1.0));

        assert_eq!(reporter.forward_steps().len(), 2);
        assert_eq!(reporter.outliers()[0].0, 1);
        assert_eq!(reporter.outliers()[0].2.chi_squared(), 900.0);
        assert_eq!(reporter.total_events(), 5);

        reporter.clear();
        assert_eq!(reporter.total_events(), 0);
    }

    #[test]
    fn test_logging_reporter() {
        let mut reporter = LoggingReporter::verbose();
        reporter.on_forward_step(0, &node());
        reporter.on_smoothed_node(&node());
        reporter.on_fit_complete(&FitQuality::new(3.0, 1.0));
    }
}
