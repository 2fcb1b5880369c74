//! # FPV Power Monitor Library
//!
//! Continuous power telemetry monitoring for FPV drones.
//!
//! This library samples voltage, current and temperature readings, checks them
//! against configurable safety bounds and delivers de-duplicated fault alerts
//! over a pluggable notification channel with bounded retries.

pub mod alert;
pub mod audit;
pub mod config;
pub mod error;
pub mod fault;
pub mod pipeline;
pub mod telemetry;
