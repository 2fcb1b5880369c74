//! # Fault Events

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::telemetry::Metric;

/// Side of the acceptable range that was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundViolated {
    /// Value below the configured minimum
    Low,
    /// Value above the configured maximum
    High,
}

impl fmt::Display for BoundViolated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundViolated::Low => f.write_str("low"),
            BoundViolated::High => f.write_str("high"),
        }
    }
}

/// A detected out-of-bounds condition for one metric at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaultEvent {
    pub metric: Metric,
    pub value: f64,
    pub bound_violated: BoundViolated,
    /// The limit that was crossed (min for `Low`, max for `High`)
    pub limit: f64,
    pub detected_at: DateTime<Utc>,
}

impl FaultEvent {
    /// Human readable one-line description, used as the notification body.
    ///
    /// ```
    /// use chrono::Utc;
    /// use fpv_power_monitor::fault::{BoundViolated, FaultEvent};
    /// use fpv_power_monitor::telemetry::Metric;
    ///
    /// let event = FaultEvent {
    ///     metric: Metric::Voltage,
    ///     value: 9.0,
    ///     bound_violated: BoundViolated::Low,
    ///     limit: 10.5,
    ///     detected_at: Utc::now(),
    /// };
    /// assert_eq!(
    ///     event.describe(),
    ///     "Potential voltage fault detected: 9.00 V (below minimum 10.50 V)"
    /// );
    /// ```
    pub fn describe(&self) -> String {
        let relation = match self.bound_violated {
            BoundViolated::Low => "below minimum",
            BoundViolated::High => "above maximum",
        };
        format!(
            "Potential {} fault detected: {:.2} {} ({} {:.2} {})",
            self.metric,
            self.value,
            self.metric.unit(),
            relation,
            self.limit,
            self.metric.unit()
        )
    }
}
