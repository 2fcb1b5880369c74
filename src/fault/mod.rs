//! # Fault Detection Module
//!
//! Threshold evaluation of telemetry readings.
//!
//! This module handles:
//! - Validated per-metric safety bounds
//! - Comparing each reading against those bounds
//! - Producing fault events for out-of-bounds values

pub mod bounds;
pub mod event;
pub mod rule_engine;

pub use bounds::{Bounds, MetricBounds};
pub use event::{BoundViolated, FaultEvent};
pub use rule_engine::{evaluate, Evaluation};
