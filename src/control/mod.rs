//! Feedback control of the conversion ratio.
//!
//! - [`RateEstimator`] - Smoothed producer rate from arrival timestamps
//! - [`RatioController`] - Occupancy-driven ratio retuning with hysteresis zones

pub mod rate_estimator;
pub mod ratio_controller;

pub use rate_estimator::RateEstimator;
pub use ratio_controller::{ControllerTuning, OccupancyZone, RatioController};
