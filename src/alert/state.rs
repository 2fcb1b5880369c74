//! # Alert State
//!
//! Per-metric de-duplication state: `Clear -> Active` on the first fault,
//! `Active -> Clear` once the metric is back inside its bounds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::telemetry::Metric;

/// Phase of a metric's alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Clear,
    Active,
}

impl fmt::Display for AlertPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertPhase::Clear => f.write_str("clear"),
            AlertPhase::Active => f.write_str("active"),
        }
    }
}

/// Last-known fault status for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AlertState {
    active: bool,
    /// When the current episode became active
    active_since: Option<DateTime<Utc>>,
    /// When a notification for this metric was last delivered
    last_notified_at: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn phase(&self) -> AlertPhase {
        if self.active {
            AlertPhase::Active
        } else {
            AlertPhase::Clear
        }
    }

    pub fn active_since(&self) -> Option<DateTime<Utc>> {
        self.active_since
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.last_notified_at
    }

    /// `Clear -> Active`. Returns `false` (and changes nothing) if already active.
    pub fn activate(&mut self, at: DateTime<Utc>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.active_since = Some(at);
        true
    }

    /// `Active -> Clear`. Returns `false` if already clear.
    pub fn clear(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.active_since = None;
        true
    }

    pub fn mark_notified(&mut self, at: DateTime<Utc>) {
        self.last_notified_at = Some(at);
    }
}

/// Alert state of every metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AlertStates {
    states: [AlertState; 3],
}

impl AlertStates {
    pub fn get(&self, metric: Metric) -> &AlertState {
        &self.states[metric.index()]
    }

    pub fn get_mut(&mut self, metric: Metric) -> &mut AlertState {
        &mut self.states[metric.index()]
    }

    /// Metrics currently in the `Active` phase
    pub fn active_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|&m| self.get(m).is_active())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_clear() {
        let states = AlertStates::default();
        for metric in Metric::ALL {
            assert_eq!(states.get(metric).phase(), AlertPhase::Clear);
            assert!(states.get(metric).last_notified_at().is_none());
        }
        assert!(states.active_metrics().is_empty());
    }

    #[test]
    fn test_activate_then_clear() {
        let now = Utc::now();
        let mut state = AlertState::default();

        assert!(state.activate(now));
        assert!(!state.activate(now), "second activation is a no-op");
        assert_eq!(state.active_since(), Some(now));

        assert!(state.clear());
        assert!(!state.clear());
        assert_eq!(state.phase(), AlertPhase::Clear);
        assert!(state.active_since().is_none());
    }

    #[test]
    fn test_last_notified_survives_clear() {
        let now = Utc::now();
        let mut state = AlertState::default();
        state.activate(now);
        state.mark_notified(now);
        state.clear();
        assert_eq!(state.last_notified_at(), Some(now));
    }

    #[test]
    fn test_states_are_independent_per_metric() {
        let mut states = AlertStates::default();
        states.get_mut(Metric::Current).activate(Utc::now());
        assert_eq!(states.active_metrics(), vec![Metric::Current]);
        assert!(!states.get(Metric::Voltage).is_active());
    }
}
