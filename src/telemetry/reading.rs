//! # Reading Types
//!
//! A [`Reading`] is an immutable snapshot of the three monitored power metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// One of the monitored telemetry channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Battery voltage in volts
    Voltage,
    /// Battery current in amperes
    Current,
    /// Power system temperature in degrees Celsius
    Temperature,
}

impl Metric {
    /// All metrics, in evaluation order
    pub const ALL: [Metric; 3] = [Metric::Voltage, Metric::Current, Metric::Temperature];

    /// Lowercase metric name as used in config and logs
    pub fn name(self) -> &'static str {
        match self {
            Metric::Voltage => "voltage",
            Metric::Current => "current",
            Metric::Temperature => "temperature",
        }
    }

    /// Measurement unit suffix
    pub fn unit(self) -> &'static str {
        match self {
            Metric::Voltage => "V",
            Metric::Current => "A",
            Metric::Temperature => "°C",
        }
    }

    /// Dense index, used for per-metric fixed-size tables
    pub(crate) fn index(self) -> usize {
        match self {
            Metric::Voltage => 0,
            Metric::Current => 1,
            Metric::Temperature => 2,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable snapshot of voltage, current and temperature at one instant.
///
/// Fields are private: once created a reading is never modified, it is only
/// replaced as a whole inside the [`SampleStore`](super::SampleStore).
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use fpv_power_monitor::telemetry::{Metric, Reading};
///
/// let reading = Reading::new(11.8, 2.1, 29.5, Utc::now());
/// assert_eq!(reading.value(Metric::Voltage), 11.8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    voltage: f64,
    current: f64,
    temperature: f64,
    timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a reading from raw metric values.
    #[must_use]
    pub fn new(voltage: f64, current: f64, temperature: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            voltage,
            current,
            temperature,
            timestamp,
        }
    }

    /// Battery voltage (V)
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Battery current (A)
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Temperature (°C)
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Time the reading was taken
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Value of a single metric
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Voltage => self.voltage,
            Metric::Current => self.current,
            Metric::Temperature => self.temperature,
        }
    }

    /// First metric whose value is NaN or infinite, if any
    pub fn first_non_finite(&self) -> Option<Metric> {
        Metric::ALL.into_iter().find(|&m| !self.value(m).is_finite())
    }
}
