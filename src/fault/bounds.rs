//! # Safety Bounds
//!
//! Closed `[min, max]` intervals per metric. A `MetricBounds` can only be
//! built through [`MetricBounds::new`], so an inverted or non-finite interval
//! never reaches per-reading evaluation.

use serde::Serialize;

use super::event::BoundViolated;
use crate::error::{MonitorError, Result};
use crate::telemetry::Metric;

/// Closed acceptable range for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricBounds {
    min: f64,
    max: f64,
}

impl MetricBounds {
    /// Create a validated range.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if either end is NaN/infinite or if
    /// `min > max`. `min == max` is accepted (a single allowed value).
    ///
    /// # Examples
    ///
    /// ```
    /// use fpv_power_monitor::fault::MetricBounds;
    ///
    /// assert!(MetricBounds::new(10.5, 12.5).is_ok());
    /// assert!(MetricBounds::new(12.5, 10.5).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(MonitorError::Config(format!(
                "bounds must be finite (got min={}, max={})",
                min, max
            )));
        }
        if min > max {
            return Err(MonitorError::Config(format!(
                "bounds min ({}) must not exceed max ({})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Lower limit (inclusive)
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper limit (inclusive)
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Which side of the interval `value` falls on, or `None` when inside.
    ///
    /// Values exactly equal to `min` or `max` are in bounds.
    pub fn classify(&self, value: f64) -> Option<BoundViolated> {
        if value < self.min {
            Some(BoundViolated::Low)
        } else if value > self.max {
            Some(BoundViolated::High)
        } else {
            None
        }
    }

    /// Whether `value` lies inside the closed interval
    pub fn contains(&self, value: f64) -> bool {
        self.classify(value).is_none()
    }

    /// The limit on the given side
    pub fn limit(&self, side: BoundViolated) -> f64 {
        match side {
            BoundViolated::Low => self.min,
            BoundViolated::High => self.max,
        }
    }
}

/// Acceptable ranges for all three metrics.
///
/// Treated as immutable once built; a reload swaps in a whole new `Bounds`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub voltage: MetricBounds,
    pub current: MetricBounds,
    pub temperature: MetricBounds,
}

impl Bounds {
    /// Range for a single metric
    pub fn for_metric(&self, metric: Metric) -> &MetricBounds {
        match metric {
            Metric::Voltage => &self.voltage,
            Metric::Current => &self.current,
            Metric::Temperature => &self.temperature,
        }
    }
}
