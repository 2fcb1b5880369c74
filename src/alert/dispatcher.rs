//! # Alert Dispatcher
//!
//! De-duplicates fault events and delivers alerts with bounded retries.
//!
//! ## State machine (per metric)
//!
//! ```text
//!            first FaultEvent                 evaluation with no fault
//!   Clear ─────────────────────▶ Active ─────────────────────────────▶ Clear
//!                                  │ ▲
//!                                  └─┘ further FaultEvents: Duplicate
//! ```
//!
//! Every `Clear -> Active` transition produces a fault notice, and with
//! `notify_on_clear` every `Active -> Clear` transition produces an all-clear
//! notice. Delivery runs on its own task so backoff sleeps never hold up the
//! evaluation cadence.
//!
//! ## Ordering
//!
//! Each metric has at most one delivery in flight. Notices raised while one is
//! in flight wait in a per-metric queue and are sent in order once it
//! resolves, so the last message an operator receives always matches the
//! metric's current phase:
//!
//! - a fault arriving while a *fault* notice is in flight or queued is
//!   coalesced into it and reported as `Duplicate`
//! - a fault arriving while only an *all-clear* is in flight is queued behind it
//! - an all-clear that is still queued when the metric faults again is
//!   withdrawn
//!
//! The queue never holds more than a fault followed by an all-clear.
//!
//! After `max_attempts` failures the outcome is `Exhausted`, logged at error
//! level, and the metric stays `Active` so a broken channel does not turn into
//! a retry storm on every tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use super::sink::{AlertMessage, NotificationSink};
use super::state::{AlertPhase, AlertStates};
use crate::audit::{AuditLog, AuditRecord};
use crate::fault::{BoundViolated, FaultEvent};
use crate::telemetry::Metric;

/// Default e-mail style subject for fault notifications
pub const DEFAULT_SUBJECT: &str = "Drone Fault Detected";

/// Classification of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The sink accepted the notification
    Delivered,
    /// Suppressed: the metric already has an active fault notice
    Duplicate,
    /// Every attempt failed
    Exhausted,
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// A metric left its bounds
    Fault,
    /// A metric returned within bounds (only when `notify_on_clear` is set)
    Clear,
}

/// Immediate result of [`AlertDispatcher::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Delivery started on a background task
    Queued,
    /// Waiting for an all-clear notice for the same metric to resolve first
    Deferred,
    /// Classified as duplicate; nothing sent
    Duplicate,
}

/// Final result of one background delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchReport {
    pub metric: Metric,
    pub notice: Notice,
    pub outcome: DispatchOutcome,
    pub attempts: u32,
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub retry: RetryPolicy,
    /// Upper bound on a single `NotificationSink::send` call
    pub send_timeout: Duration,
    /// Send an "all clear" notice on `Active -> Clear`
    pub notify_on_clear: bool,
    pub subject: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            send_timeout: Duration::from_secs(10),
            notify_on_clear: false,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    states: AlertStates,
    /// Notice currently being delivered, per metric
    in_flight: [Option<Notice>; 3],
    /// Notices waiting for the in-flight one, per metric
    queued: [VecDeque<Delivery>; 3],
}

impl Ledger {
    /// Most recent notice sent or about to be sent for `metric`
    fn latest(&self, metric: Metric) -> Option<Notice> {
        let slot = metric.index();
        self.queued[slot]
            .back()
            .map(|d| d.notice)
            .or(self.in_flight[slot])
    }
}

#[derive(Debug)]
struct Delivery {
    metric: Metric,
    notice: Notice,
    value: f64,
    side: Option<BoundViolated>,
    message: AlertMessage,
    /// Caller waiting for the final report
    waiter: Option<oneshot::Sender<DispatchReport>>,
}

enum Admission {
    /// Deliver now
    Deliver(Delivery),
    /// Queued behind an in-flight all-clear
    Deferred,
    /// Already active (`coalesced` when folded into a pending fault notice)
    Duplicate { coalesced: bool },
}

enum Recovery {
    Send(Delivery),
    Queued,
    Silent,
}

struct Inner {
    sink: Arc<dyn NotificationSink>,
    settings: DispatcherSettings,
    ledger: Mutex<Ledger>,
    deliveries: Mutex<JoinSet<DispatchReport>>,
    audit: AuditLog,
}

/// De-duplicating, retrying alert dispatcher.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct AlertDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("settings", &self.inner.settings)
            .field("states", &self.states())
            .finish_non_exhaustive()
    }
}

impl AlertDispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        settings: DispatcherSettings,
        audit: AuditLog,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                settings,
                ledger: Mutex::new(Ledger::default()),
                deliveries: Mutex::new(JoinSet::new()),
                audit,
            }),
        }
    }

    /// Classify `event` and, on `Clear -> Active`, deliver it in place.
    ///
    /// Awaits the whole retry sequence (and, if the fault had to queue behind
    /// an all-clear, that one too), so the returned outcome is final. The
    /// pipeline uses [`submit`](Self::submit) instead so it never blocks on
    /// backoff.
    pub async fn dispatch(&self, event: FaultEvent) -> DispatchOutcome {
        let (waiter, report) = oneshot::channel();
        match self.admit(&event, Some(waiter)) {
            Admission::Duplicate { .. } => DispatchOutcome::Duplicate,
            Admission::Deliver(delivery) => Arc::clone(&self.inner).deliver(delivery).await.outcome,
            Admission::Deferred => match report.await {
                Ok(report) => report.outcome,
                Err(_) => {
                    error!(metric = %event.metric, "Queued fault notice was dropped before delivery");
                    DispatchOutcome::Exhausted
                }
            },
        }
    }

    /// Classify `event` and, on `Clear -> Active`, start delivery on a
    /// background task. Returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, event: FaultEvent) -> Submission {
        match self.admit(&event, None) {
            Admission::Duplicate { .. } => Submission::Duplicate,
            Admission::Deferred => Submission::Deferred,
            Admission::Deliver(delivery) => {
                self.inner.spawn(delivery);
                Submission::Queued
            }
        }
    }

    /// Record that `metric` evaluated within bounds.
    ///
    /// Moves an active metric back to `Clear` and returns `true`; returns
    /// `false` if it was already clear. With `notify_on_clear` an all-clear
    /// notice is sent, queued behind the fault notice if that is still in
    /// flight.
    pub fn resolve(&self, metric: Metric, value: f64, at: DateTime<Utc>) -> bool {
        let recovery = {
            let mut guard = self.inner.ledger();
            let ledger = &mut *guard;
            if !ledger.states.get_mut(metric).clear() {
                return false;
            }

            if !self.inner.settings.notify_on_clear {
                Recovery::Silent
            } else {
                let slot = metric.index();
                let delivery = self.clear_delivery(metric, value);
                match ledger.latest(metric) {
                    None => {
                        ledger.in_flight[slot] = Some(Notice::Clear);
                        Recovery::Send(delivery)
                    }
                    Some(Notice::Fault) => {
                        ledger.queued[slot].push_back(delivery);
                        Recovery::Queued
                    }
                    // Only reachable if a fault never went through admit
                    Some(Notice::Clear) => Recovery::Silent,
                }
            }
        };

        info!(
            metric = %metric,
            "{} back within bounds: {:.2} {}",
            metric,
            value,
            metric.unit()
        );
        self.inner.audit.record(&AuditRecord::Transition {
            metric,
            from: AlertPhase::Active,
            to: AlertPhase::Clear,
            value,
            at,
        });

        match recovery {
            Recovery::Send(delivery) => self.inner.spawn(delivery),
            Recovery::Queued => {
                debug!(metric = %metric, "All-clear notice queued behind fault delivery")
            }
            Recovery::Silent => {}
        }

        true
    }

    /// Wait for every background delivery to resolve.
    ///
    /// Returns the reports of the deliveries awaited here. Deliveries queued
    /// while draining are awaited too.
    pub async fn drain(&self) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        loop {
            let mut set = std::mem::take(&mut *self.inner.deliveries());
            if set.is_empty() {
                break;
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(report) => reports.push(report),
                    Err(e) => error!("Alert delivery task failed: {}", e),
                }
            }
        }
        reports
    }

    /// Snapshot of the per-metric alert states
    pub fn states(&self) -> AlertStates {
        self.inner.ledger().states
    }

    /// Number of metrics with a delivery currently in flight
    pub fn in_flight(&self) -> usize {
        self.inner
            .ledger()
            .in_flight
            .iter()
            .filter(|n| n.is_some())
            .count()
    }

    fn admit(
        &self,
        event: &FaultEvent,
        waiter: Option<oneshot::Sender<DispatchReport>>,
    ) -> Admission {
        let slot = event.metric.index();
        let (activated, admission) = {
            let mut guard = self.inner.ledger();
            let ledger = &mut *guard;
            let activated = ledger
                .states
                .get_mut(event.metric)
                .activate(event.detected_at);

            let admission = if !activated {
                Admission::Duplicate { coalesced: false }
            } else {
                // A queued all-clear went stale the moment the metric faulted again
                if ledger.queued[slot].back().map(|d| d.notice) == Some(Notice::Clear) {
                    ledger.queued[slot].pop_back();
                }
                match ledger.latest(event.metric) {
                    None => {
                        ledger.in_flight[slot] = Some(Notice::Fault);
                        Admission::Deliver(self.fault_delivery(event, waiter))
                    }
                    Some(Notice::Clear) => {
                        ledger.queued[slot].push_back(self.fault_delivery(event, waiter));
                        Admission::Deferred
                    }
                    Some(Notice::Fault) => Admission::Duplicate { coalesced: true },
                }
            };
            (activated, admission)
        };

        if activated {
            warn!(
                metric = %event.metric,
                value = event.value,
                side = %event.bound_violated,
                "{}",
                event.describe()
            );
            self.inner.audit.record(&AuditRecord::Transition {
                metric: event.metric,
                from: AlertPhase::Clear,
                to: AlertPhase::Active,
                value: event.value,
                at: event.detected_at,
            });
        }

        let coalesced = match admission {
            Admission::Duplicate { coalesced } => coalesced,
            Admission::Deferred => {
                debug!(metric = %event.metric, "Fault notice queued behind all-clear delivery");
                return Admission::Deferred;
            }
            deliver => return deliver,
        };

        if coalesced {
            debug!(metric = %event.metric, "Fault coalesced into pending fault notice");
        } else {
            debug!(metric = %event.metric, value = event.value, "Duplicate fault suppressed");
        }

        self.inner.audit.record(&AuditRecord::Dispatch {
            metric: event.metric,
            notice: Notice::Fault,
            value: event.value,
            side: Some(event.bound_violated),
            outcome: DispatchOutcome::Duplicate,
            attempts: 0,
            at: event.detected_at,
        });
        Admission::Duplicate { coalesced }
    }

    fn fault_delivery(
        &self,
        event: &FaultEvent,
        waiter: Option<oneshot::Sender<DispatchReport>>,
    ) -> Delivery {
        Delivery {
            metric: event.metric,
            notice: Notice::Fault,
            value: event.value,
            side: Some(event.bound_violated),
            message: AlertMessage::new(self.inner.settings.subject.clone(), event.describe()),
            waiter,
        }
    }

    fn clear_delivery(&self, metric: Metric, value: f64) -> Delivery {
        Delivery {
            metric,
            notice: Notice::Clear,
            value,
            side: None,
            message: AlertMessage::new(
                format!("{}: {} back to normal", self.inner.settings.subject, metric),
                format!(
                    "{} back within bounds: {:.2} {}",
                    metric,
                    value,
                    metric.unit()
                ),
            ),
            waiter: None,
        }
    }
}

impl Inner {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliveries(&self) -> MutexGuard<'_, JoinSet<DispatchReport>> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(self: &Arc<Self>, delivery: Delivery) {
        let mut deliveries = self.deliveries();
        // Reap finished tasks so a long run does not accumulate join results.
        while let Some(joined) = deliveries.try_join_next() {
            if let Err(e) = joined {
                error!("Alert delivery task failed: {}", e);
            }
        }
        deliveries.spawn(Arc::clone(self).deliver(delivery));
    }

    async fn deliver(self: Arc<Self>, delivery: Delivery) -> DispatchReport {
        let policy = self.settings.retry;
        let mut attempts = 0;
        let mut delivered = false;

        while attempts < policy.max_attempts {
            attempts += 1;

            let delay = policy.delay_before(attempts);
            if !delay.is_zero() {
                debug!(metric = %delivery.metric, attempt = attempts, "Retrying notification in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.settings.send_timeout, self.sink.send(&delivery.message))
                .await
            {
                Ok(Ok(())) => {
                    delivered = true;
                    break;
                }
                Ok(Err(e)) => warn!(
                    metric = %delivery.metric,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    "Notification attempt failed: {}",
                    e
                ),
                Err(_) => warn!(
                    metric = %delivery.metric,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    "Notification attempt timed out after {:?}",
                    self.settings.send_timeout
                ),
            }
        }

        let outcome = if delivered {
            DispatchOutcome::Delivered
        } else {
            DispatchOutcome::Exhausted
        };
        self.finish(delivery, outcome, attempts)
    }

    fn finish(
        self: &Arc<Self>,
        mut delivery: Delivery,
        outcome: DispatchOutcome,
        attempts: u32,
    ) -> DispatchReport {
        let now = Utc::now();
        let next = {
            let mut ledger = self.ledger();
            let slot = delivery.metric.index();
            if outcome == DispatchOutcome::Delivered {
                ledger.states.get_mut(delivery.metric).mark_notified(now);
            }
            let next = ledger.queued[slot].pop_front();
            ledger.in_flight[slot] = next.as_ref().map(|d| d.notice);
            next
        };

        match outcome {
            DispatchOutcome::Delivered => info!(
                metric = %delivery.metric,
                attempts,
                "Alert delivered: {}",
                delivery.message.body
            ),
            _ => error!(
                metric = %delivery.metric,
                attempts,
                "Alert delivery exhausted after {} attempt(s): {}",
                attempts,
                delivery.message.body
            ),
        }

        self.audit.record(&AuditRecord::Dispatch {
            metric: delivery.metric,
            notice: delivery.notice,
            value: delivery.value,
            side: delivery.side,
            outcome,
            attempts,
            at: now,
        });

        let report = DispatchReport {
            metric: delivery.metric,
            notice: delivery.notice,
            outcome,
            attempts,
        };
        if let Some(waiter) = delivery.waiter.take() {
            // The caller may have given up waiting
            let _ = waiter.send(report);
        }

        if let Some(next) = next {
            debug!(metric = %next.metric, notice = ?next.notice, "Sending queued notice");
            self.spawn(next);
        }

        report
    }
}
