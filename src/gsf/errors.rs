//! Error types for the Gaussian Sum fitter
//!
//! Every variant is fatal to the current fit only. Outlier rejection is not
//! an error and never shows up here.

use std::fmt;

use super::types::SurfaceId;

/// Errors that can occur during a fit
#[derive(Debug, Clone)]
pub enum GsfError {
    /// An operation received a mixture without components
    EmptyMixture,

    /// Measurement update failed for every component
    UpdateFailed {
        /// Description of the failure
        description: String,
    },

    /// Mixture combination produced a non-PSD covariance
    CombinerFailed {
        /// Description of the failure
        description: String,
    },

    /// The extrapolator could not reach a surface
    ExtrapolationFailed {
        /// Target surface
        surface: SurfaceId,
        /// Description of the failure
        description: String,
    },

    /// The backward smoothing pass was aborted
    SmoothingFailed {
        /// Description of the step that failed
        description: String,
        /// Underlying cause, if any
        cause: Option<Box<GsfError>>,
    },

    /// Extrapolation to, or collapse at, the perigee failed
    PerigeeFailed {
        /// Description of the failure
        description: String,
    },

    /// The aggregated χ² is non-finite or not positive
    DegenerateFitQuality {
        /// Aggregated χ²
        chi_squared: f64,
        /// Aggregated degrees of freedom
        ndof: f64,
    },

    /// The fit was called without any usable input
    EmptyInput {
        /// What was empty
        description: String,
    },

    /// Dimension mismatch between expected and actual
    DimensionMismatch {
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
        /// Context (e.g., "measurement covariance")
        context: String,
    },

    /// Configuration error
    Configuration {
        /// Description of the configuration issue
        description: String,
    },
}

impl GsfError {
    /// Wrap an error as the cause of a smoothing failure
    pub fn smoothing(description: impl Into<String>, cause: GsfError) -> Self {
        GsfError::SmoothingFailed {
            description: description.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

impl fmt::Display for GsfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GsfError::EmptyMixture => write!(f, "Mixture has no components"),
            GsfError::UpdateFailed { description } => {
                write!(f, "Measurement update failed: {}", description)
            }
            GsfError::CombinerFailed { description } => {
                write!(f, "Mixture combination failed: {}", description)
            }
            GsfError::ExtrapolationFailed {
                surface,
                description,
            } => {
                write!(
                    f,
                    "Extrapolation to surface {} failed: {}",
                    surface.0, description
                )
            }
            GsfError::SmoothingFailed { description, cause } => match cause {
                Some(cause) => write!(f, "Smoothing failed: {} ({})", description, cause),
                None => write!(f, "Smoothing failed: {}", description),
            },
            GsfError::PerigeeFailed { description } => {
                write!(f, "Perigee determination failed: {}", description)
            }
            GsfError::DegenerateFitQuality { chi_squared, ndof } => {
                write!(
                    f,
                    "Degenerate fit quality: chi2 = {}, ndof = {}",
                    chi_squared, ndof
                )
            }
            GsfError::EmptyInput { description } => write!(f, "Empty input: {}", description),
            GsfError::DimensionMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "Dimension mismatch for {}: expected {}, got {}",
                    context, expected, actual
                )
            }
            GsfError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
        }
    }
}

impl std::error::Error for GsfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GsfError::SmoothingFailed {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
