//! Fitter configuration
//!
//! Only configuration outlives a single fit; it is validated once when the
//! fitter is built.

use serde::{Deserialize, Serialize};

use super::errors::GsfError;
use super::types::N_TRACK_PARAMS;

/// Hard upper bound for `maximum_number_of_components`.
pub const MAX_STATE_COMPONENTS: usize = 72;

/// Gaussian Sum fitter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsfConfig {
    /// Cap on the number of mixture components; lowest weights are dropped
    pub maximum_number_of_components: usize,
    /// A hit is an outlier when `chi2 > cutoff * ndof`
    pub chi_squared_outlier_cutoff: f64,
    /// Combine the forward prediction with the smoother update at each surface
    pub combine_with_forward: bool,
    /// Fit calibrated measurements (`true`) or re-calibrate raw hits (`false`)
    pub refit_on_measurements: bool,
    /// Feed previous outliers back into a refit
    pub reintegrate_outliers: bool,
    /// Variance scale factors `[loc1, loc2, phi, theta, qOverP]` used to
    /// weaken the first smoothed state before the backward sweep
    pub smoother_covariance_scale: [f64; N_TRACK_PARAMS],
    /// Mahalanobis distance below which components are merged before
    /// pruning; `None` prunes only
    pub merge_threshold: Option<f64>,
}

impl Default for GsfConfig {
    fn default() -> Self {
        Self {
            maximum_number_of_components: 12,
            chi_squared_outlier_cutoff: 50.0,
            combine_with_forward: false,
            refit_on_measurements: true,
            reintegrate_outliers: false,
            smoother_covariance_scale: [15.0, 15.0, 5.0, 5.0, 15.0],
            merge_threshold: None,
        }
    }
}

impl GsfConfig {
    /// Set the component cap
    pub fn with_max_components(mut self, max: usize) -> Self {
        self.maximum_number_of_components = max;
        self
    }

    /// Set the χ²/ndof outlier cutoff
    pub fn with_outlier_cutoff(mut self, cutoff: f64) -> Self {
        self.chi_squared_outlier_cutoff = cutoff;
        self
    }

    /// Enable or disable forward/smoother combination
    pub fn with_forward_combination(mut self, enabled: bool) -> Self {
        self.combine_with_forward = enabled;
        self
    }

    /// Choose between measurement and raw-hit fitting
    pub fn with_refit_on_measurements(mut self, enabled: bool) -> Self {
        self.refit_on_measurements = enabled;
        self
    }

    pub fn with_reintegrated_outliers(mut self, enabled: bool) -> Self {
        self.reintegrate_outliers = enabled;
        self
    }

    pub fn with_merge_threshold(mut self, threshold: Option<f64>) -> Self {
        self.merge_threshold = threshold;
        self
    }

    pub fn with_smoother_covariance_scale(mut self, scale: [f64; N_TRACK_PARAMS]) -> Self {
        self.smoother_covariance_scale = scale;
        self
    }

    /// Check the configuration for values the fitter cannot work with
    pub fn validate(&self) -> Result<(), GsfError> {
        if self.maximum_number_of_components == 0
            || self.maximum_number_of_components > MAX_STATE_COMPONENTS
        {
            return Err(GsfError::Configuration {
                description: format!(
                    "maximum_number_of_components must be in 1..={}, got {}",
                    MAX_STATE_COMPONENTS, self.maximum_number_of_components
                ),
            });
        }
        if !self.chi_squared_outlier_cutoff.is_finite() || self.chi_squared_outlier_cutoff <= 0.0 {
            return Err(GsfError::Configuration {
                description: format!(
                    "chi_squared_outlier_cutoff must be finite and positive, got {}",
                    self.chi_squared_outlier_cutoff
                ),
            });
        }
        if self
            .smoother_covariance_scale
            .iter()
            .any(|s| !s.is_finite() || *s < 1.0)
        {
            return Err(GsfError::Configuration {
                description: format!(
                    "smoother_covariance_scale entries must be finite and >= 1, got {:?}",
                    self.smoother_covariance_scale
                ),
            });
        }
        if let Some(threshold) = self.merge_threshold {
            if threshold.is_nan() || threshold <= 0.0 {
                return Err(GsfError::Configuration {
                    description: format!("merge_threshold must be positive, got {}", threshold),
                });
            }
        }
        Ok(())
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, GsfError> {
        let config: GsfConfig =
            serde_json::from_str(json).map_err(|e| GsfError::Configuration {
                description: format!("invalid configuration JSON: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GsfConfig::default().validate().is_ok());
    }

    #[test]
    fn test_component_cap_bounds() {
        assert!(GsfConfig::default().with_max_components(0).validate().is_err());
        assert!(GsfConfig::default()
            .with_max_components(MAX_STATE_COMPONENTS + 1)
            .validate()
            .is_err());
        assert!(GsfConfig::default()
            .with_max_components(MAX_STATE_COMPONENTS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_cutoff_and_scales() {
        assert!(GsfConfig::default().with_outlier_cutoff(f64::NAN).validate().is_err());
        assert!(GsfConfig::default().with_outlier_cutoff(-1.0).validate().is_err());
        assert!(GsfConfig::default()
            .with_smoother_covariance_scale([1.0, 1.0, 0.5, 1.0, 1.0])
            .validate()
            .is_err());
        assert!(GsfConfig::default()
            .with_merge_threshold(Some(0.0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_roundtrip_with_partial_input() {
        let config = GsfConfig::from_json(r#"{"maximum_number_of_components": 6}"#).unwrap();
        assert_eq!(config.maximum_number_of_components, 6);
        assert_eq!(config.chi_squared_outlier_cutoff, 50.0);

        let json = config.to_json_pretty();
        assert!(json.contains("chi_squared_outlier_cutoff"));
        assert_eq!(GsfConfig::from_json(&json).unwrap(), config);

        assert!(GsfConfig::from_json(r#"{"maximum_number_of_components": 0}"#).is_err());
        assert!(GsfConfig::from_json("not json").is_err());
    }
}
