//! # Sampler
//!
//! Periodically pulls a reading from the [`ReadingSource`], validates it and
//! publishes it into the [`SampleStore`].
//!
//! ## Failure handling
//!
//! - **Source failure**: logged at warn, store left untouched, retried on the
//!   next tick. Failures never stop the sampler.
//! - **Malformed reading** (NaN, infinite, outside the plausible envelope):
//!   logged at warn, recorded in the audit log, never published.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::reading::{Metric, Reading};
use super::source::ReadingSource;
use super::store::SampleStore;
use crate::audit::{AuditLog, AuditRecord};
use crate::error::{MonitorError, Result};
use crate::fault::Bounds;

/// Physically plausible range for each metric.
///
/// Much wider than the safety bounds: a value outside the envelope is a
/// sensor or link glitch, not a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibleEnvelope {
    limits: Bounds,
}

impl PlausibleEnvelope {
    pub fn new(limits: Bounds) -> Self {
        Self { limits }
    }

    /// Check that every value is finite and inside the envelope.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::MalformedReading` naming the first offending metric.
    pub fn check(&self, reading: &Reading) -> Result<()> {
        if let Some(metric) = reading.first_non_finite() {
            return Err(MonitorError::MalformedReading(format!(
                "{} is {}",
                metric,
                reading.value(metric)
            )));
        }

        for metric in Metric::ALL {
            let value = reading.value(metric);
            let range = self.limits.for_metric(metric);
            if !range.contains(value) {
                return Err(MonitorError::MalformedReading(format!(
                    "{} {} {} outside plausible range [{}, {}]",
                    metric,
                    value,
                    metric.unit(),
                    range.min(),
                    range.max()
                )));
            }
        }

        Ok(())
    }
}

/// Running counters for the sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub published: u64,
    pub rejected: u64,
    pub source_failures: u64,
}

/// Periodic producer of readings.
pub struct Sampler {
    source: Box<dyn ReadingSource>,
    store: SampleStore,
    envelope: PlausibleEnvelope,
    audit: AuditLog,
    stats: SamplerStats,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("source", &self.source.name())
            .field("envelope", &self.envelope)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    pub fn new(
        source: Box<dyn ReadingSource>,
        store: SampleStore,
        envelope: PlausibleEnvelope,
        audit: AuditLog,
    ) -> Self {
        Self {
            source,
            store,
            envelope,
            audit,
            stats: SamplerStats::default(),
        }
    }

    /// Store this sampler publishes into
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Take one sample.
    ///
    /// On success the reading has been published and is returned. Running a
    /// tick again simply takes another sample.
    ///
    /// # Errors
    ///
    /// - `MonitorError::Source` (or whatever the source returned) on source failure
    /// - `MonitorError::MalformedReading` if validation rejected the reading
    ///
    /// In both cases the store is left unchanged.
    pub async fn tick(&mut self) -> Result<Reading> {
        let reading = match self.source.read().await {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.source_failures += 1;
                warn!(source = self.source.name(), "Failed to read telemetry: {}", e);
                return Err(e);
            }
        };

        if let Err(e) = self.envelope.check(&reading) {
            self.stats.rejected += 1;
            warn!(source = self.source.name(), "Rejected reading: {}", e);
            self.audit.record(&AuditRecord::Rejected {
                reason: e.to_string(),
                at: reading.timestamp(),
            });
            return Err(e);
        }

        self.store.set(reading);
        self.stats.published += 1;
        debug!(
            "Voltage: {:.2} V, Current: {:.2} A, Temperature: {:.1} °C",
            reading.voltage(),
            reading.current(),
            reading.temperature()
        );
        self.audit.record(&AuditRecord::sample(&reading));

        Ok(reading)
    }

    /// Sample every `period` until `shutdown` flips to `true` (or its sender
    /// is dropped). A tick in progress always completes.
    ///
    /// Returns the sampler so it can be restarted.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(source = self.source.name(), "Sampling every {:?}", period);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    // Failures are logged inside tick and retried next period
                    let _ = self.tick().await;
                }
            }
        }

        info!(
            published = self.stats.published,
            rejected = self.stats.rejected,
            source_failures = self.stats.source_failures,
            "Sampler stopped"
        );
        self
    }
}
