//! Shared test helpers for the fitter integration tests
//!
//! Tolerance assertions and toy scenario builders.

pub mod assertions;
pub mod scenarios;
