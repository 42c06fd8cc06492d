//! Core algorithmic components
//!
//! This module provides the mixture-level building blocks used by the
//! forward filter and the smoother:
//!
//! - [`updator`] - Per-component Kalman update with likelihood reweighting
//! - [`combiner`] - Collapse, combination and reduction of mixtures
//! - [`outlier`] - χ² outlier decision

pub mod combiner;
pub mod outlier;
pub mod updator;

pub use combiner::{
    collapse_to_mixture, collapse_to_single, combine, combine_with, reduce, Reduction,
};
pub use outlier::{is_outlier, recorded_fit_quality};
pub use updator::{default_prior_covariance, fit_quality, update, DEFAULT_PRIOR_VARIANCES};
