//! Common utilities shared by the fitter components.
//!
//! This module contains the linear algebra helpers used by the updator, the
//! combiner and the smoother.

pub mod linalg;
