//! # Rule Engine
//!
//! Pure evaluation of a [`Reading`] against [`Bounds`].
//!
//! Every metric is checked against its closed `[min, max]` interval. A value
//! strictly outside produces a [`FaultEvent`] on every evaluation; suppressing
//! repeats of an already active fault is the dispatcher's job. The prior alert
//! states are used only to report which active metrics have returned inside
//! their bounds.

use crate::alert::AlertStates;
use crate::error::{MonitorError, Result};
use crate::telemetry::{Metric, Reading};

use super::bounds::Bounds;
use super::event::FaultEvent;

/// Outcome of evaluating one reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// One event per out-of-bounds metric, in [`Metric::ALL`] order
    pub faults: Vec<FaultEvent>,
    /// Metrics that were active in the prior state and are now in bounds
    pub cleared: Vec<Metric>,
}

impl Evaluation {
    /// Whether the reading was inside bounds on every metric
    pub fn is_healthy(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Evaluate `reading` against `bounds`.
///
/// Deterministic: the same inputs always produce the same [`Evaluation`].
///
/// # Errors
///
/// Returns `MonitorError::Invariant` if the reading carries a NaN or infinite
/// value. The sampler rejects such readings before publication, so reaching
/// this is a programming error; the evaluation is abandoned rather than
/// producing events from a meaningless comparison.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use fpv_power_monitor::alert::AlertStates;
/// use fpv_power_monitor::fault::{evaluate, BoundViolated, Bounds, MetricBounds};
/// use fpv_power_monitor::telemetry::{Metric, Reading};
///
/// let bounds = Bounds {
///     voltage: MetricBounds::new(10.5, 12.5)?,
///     current: MetricBounds::new(1.5, 2.5)?,
///     temperature: MetricBounds::new(0.0, 30.0)?,
/// };
/// let reading = Reading::new(9.0, 2.0, 25.0, Utc::now());
///
/// let eval = evaluate(&reading, &bounds, &AlertStates::default())?;
/// assert_eq!(eval.faults.len(), 1);
/// assert_eq!(eval.faults[0].metric, Metric::Voltage);
/// assert_eq!(eval.faults[0].bound_violated, BoundViolated::Low);
/// # Ok::<(), fpv_power_monitor::error::MonitorError>(())
/// ```
pub fn evaluate(reading: &Reading, bounds: &Bounds, prior: &AlertStates) -> Result<Evaluation> {
    if let Some(metric) = reading.first_non_finite() {
        return Err(MonitorError::Invariant(format!(
            "non-finite {} value {} reached rule evaluation",
            metric,
            reading.value(metric)
        )));
    }

    let mut evaluation = Evaluation::default();

    for metric in Metric::ALL {
        let value = reading.value(metric);
        let range = bounds.for_metric(metric);

        match range.classify(value) {
            Some(side) => evaluation.faults.push(FaultEvent {
                metric,
                value,
                bound_violated: side,
                limit: range.limit(side),
                detected_at: reading.timestamp(),
            }),
            None if prior.get(metric).is_active() => evaluation.cleared.push(metric),
            None => {}
        }
    }

    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{BoundViolated, MetricBounds};
    use chrono::Utc;

    fn bounds() -> Bounds {
        Bounds {
            voltage: MetricBounds::new(10.5, 12.5).unwrap(),
            current: MetricBounds::new(1.5, 2.5).unwrap(),
            temperature: MetricBounds::new(0.0, 30.0).unwrap(),
        }
    }

    fn reading(voltage: f64, current: f64, temperature: f64) -> Reading {
        Reading::new(voltage, current, temperature, Utc::now())
    }

    #[test]
    fn test_in_bounds_reading_has_no_faults() {
        let samples = [
            (10.5, 1.5, 0.0),
            (11.0, 2.0, 15.0),
            (12.5, 2.5, 30.0),
            (11.75, 1.99, 29.9),
        ];
        for (v, c, t) in samples {
            let eval = evaluate(&reading(v, c, t), &bounds(), &AlertStates::default()).unwrap();
            assert!(eval.is_healthy(), "({v}, {c}, {t}) should be in bounds");
            assert!(eval.cleared.is_empty());
        }
    }

    #[test]
    fn test_boundary_values_are_in_bounds() {
        let b = bounds();
        for r in [reading(10.5, 1.5, 0.0), reading(12.5, 2.5, 30.0)] {
            let eval = evaluate(&r, &b, &AlertStates::default()).unwrap();
            assert!(eval.faults.is_empty());
        }
    }

    #[test]
    fn test_single_metric_violation_produces_one_event() {
        let cases = [
            (reading(9.0, 2.0, 20.0), Metric::Voltage, BoundViolated::Low, 10.5),
            (reading(13.0, 2.0, 20.0), Metric::Voltage, BoundViolated::High, 12.5),
            (reading(11.0, 1.0, 20.0), Metric::Current, BoundViolated::Low, 1.5),
            (reading(11.0, 3.0, 20.0), Metric::Current, BoundViolated::High, 2.5),
            (reading(11.0, 2.0, -5.0), Metric::Temperature, BoundViolated::Low, 0.0),
            (reading(11.0, 2.0, 35.0), Metric::Temperature, BoundViolated::High, 30.0),
        ];

        for (r, metric, side, limit) in cases {
            let eval = evaluate(&r, &bounds(), &AlertStates::default()).unwrap();
            assert_eq!(eval.faults.len(), 1, "expected one fault for {metric}");
            let event = eval.faults[0];
            assert_eq!(event.metric, metric);
            assert_eq!(event.bound_violated, side);
            assert_eq!(event.limit, limit);
            assert_eq!(event.value, r.value(metric));
            assert_eq!(event.detected_at, r.timestamp());
        }
    }

    #[test]
    fn test_multiple_violations_in_metric_order() {
        let eval =
            evaluate(&reading(9.0, 3.0, 40.0), &bounds(), &AlertStates::default()).unwrap();
        let metrics: Vec<Metric> = eval.faults.iter().map(|e| e.metric).collect();
        assert_eq!(metrics, vec![Metric::Voltage, Metric::Current, Metric::Temperature]);
    }

    #[test]
    fn test_cleared_reported_only_for_previously_active() {
        let mut prior = AlertStates::default();
        prior.get_mut(Metric::Voltage).activate(Utc::now());

        let eval = evaluate(&reading(11.0, 2.0, 20.0), &bounds(), &prior).unwrap();
        assert!(eval.faults.is_empty());
        assert_eq!(eval.cleared, vec![Metric::Voltage]);
    }

    #[test]
    fn test_still_violating_active_metric_is_not_cleared() {
        let mut prior = AlertStates::default();
        prior.get_mut(Metric::Voltage).activate(Utc::now());

        let eval = evaluate(&reading(9.5, 2.0, 20.0), &bounds(), &prior).unwrap();
        assert_eq!(eval.faults.len(), 1);
        assert!(eval.cleared.is_empty());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let r = reading(9.0, 2.7, 31.0);
        let prior = AlertStates::default();
        let first = evaluate(&r, &bounds(), &prior).unwrap();
        let second = evaluate(&r, &bounds(), &prior).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_finite_value_fails_fast() {
        let err = evaluate(&reading(f64::NAN, 2.0, 20.0), &bounds(), &AlertStates::default())
            .unwrap_err();
        assert!(matches!(err, MonitorError::Invariant(_)));
    }
}
