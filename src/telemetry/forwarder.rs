//! # Telemetry Forwarder
//!
//! Periodically posts the latest reading from the [`SampleStore`] to a
//! remote collector. It is a plain consumer of the store and never touches
//! fault evaluation or alerting.
//!
//! Each tick sends whatever reading is current, so a collector sees a steady
//! heartbeat even when the sampler is briefly failing. A failed post is
//! logged at warn and dropped; the next tick sends a fresh snapshot.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::reading::Reading;
use super::store::SampleStore;
use crate::error::{MonitorError, Result};

/// Remote endpoint that accepts readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryUplink: Send + Sync {
    /// Post one reading
    async fn post(&self, reading: &Reading) -> Result<()>;
}

/// Posts readings as JSON (`{"voltage", "current", "temperature", "timestamp"}`).
pub struct HttpUplink {
    endpoint: String,
    client: Client,
}

impl std::fmt::Debug for HttpUplink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUplink")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpUplink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryUplink for HttpUplink {
    async fn post(&self, reading: &Reading) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(reading)
            .send()
            .await
            .map_err(|e| MonitorError::Notify(format!("telemetry upload failed: {}", e)))?
            .error_for_status()
            .map_err(|e| MonitorError::Notify(format!("collector rejected telemetry: {}", e)))?;
        Ok(())
    }
}

/// Running counters for the forwarder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub sent: u64,
    pub failed: u64,
    /// Ticks with nothing published yet
    pub idle: u64,
}

/// Periodic uploader of the latest reading.
pub struct Forwarder {
    uplink: Arc<dyn TelemetryUplink>,
    store: SampleStore,
    timeout: Duration,
    stats: ForwarderStats,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("timeout", &self.timeout)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    /// `timeout` bounds a single post.
    pub fn new(uplink: Arc<dyn TelemetryUplink>, store: SampleStore, timeout: Duration) -> Self {
        Self {
            uplink,
            store,
            timeout,
            stats: ForwarderStats::default(),
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        self.stats
    }

    /// Post the current reading once.
    ///
    /// Returns `Ok(None)` when nothing has been published yet.
    ///
    /// # Errors
    ///
    /// `MonitorError::Notify` if the post failed or timed out.
    pub async fn tick(&mut self) -> Result<Option<Reading>> {
        let Some(reading) = self.store.get() else {
            self.stats.idle += 1;
            debug!("No telemetry to forward yet");
            return Ok(None);
        };

        let result = match tokio::time::timeout(self.timeout, self.uplink.post(&reading)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::Notify(format!(
                "telemetry upload timed out after {:?}",
                self.timeout
            ))),
        };

        match result {
            Ok(()) => {
                self.stats.sent += 1;
                debug!("Forwarded reading taken at {}", reading.timestamp());
                Ok(Some(reading))
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!("Failed to forward telemetry: {}", e);
                Err(e)
            }
        }
    }

    /// Forward every `period` until `shutdown` flips to `true`. Returns the
    /// forwarder so it can be restarted.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Forwarding telemetry every {:?}", period);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
            }
        }

        info!(
            sent = self.stats.sent,
            failed = self.stats.failed,
            "Telemetry forwarder stopped"
        );
        self
    }
}
