//! # Telemetry Pipeline
//!
//! Wires Sampler → SampleStore → RuleEngine → AlertDispatcher.
//!
//! Two tasks run while the pipeline is started:
//!
//! - the **sampler** publishes a reading every `sample_interval`
//! - the **evaluator** reads the store every `evaluate_interval`, evaluates the
//!   reading against the current bounds and hands faults to the dispatcher
//!
//! When built [`with_forwarder`](TelemetryPipeline::with_forwarder) a third
//! task uploads the latest reading to a remote collector on its own cadence.
//!
//! The store is the only state they share. Within one evaluation tick the
//! order is strictly read → evaluate → dispatch; deliveries run on their own
//! tasks so a slow notification channel cannot delay the next tick.
//!
//! ## Lifecycle
//!
//! - [`start`](TelemetryPipeline::start) spawns the tasks. Calling it while
//!   running returns `MonitorError::AlreadyRunning`.
//! - [`stop`](TelemetryPipeline::stop) signals every task, waits for the tick
//!   in progress to finish, then waits for every in-flight delivery to
//!   resolve. After it returns nothing is left retrying in the background.
//! - A stopped pipeline can be started again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDispatcher, AlertStates, DispatchReport, Submission};
use crate::error::{MonitorError, Result};
use crate::fault::{evaluate, Bounds, FaultEvent};
use crate::telemetry::{
    Forwarder, ForwarderStats, Metric, Reading, SampleStore, Sampler, TelemetryUplink,
};

/// Cadences for the two pipeline tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub sample_interval: Duration,
    pub evaluate_interval: Duration,
}

/// What one evaluation tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Reading that was evaluated; `None` before the first sample
    pub reading: Option<Reading>,
    /// The reading had already been evaluated on a previous tick
    pub stale: bool,
    pub faults: Vec<FaultEvent>,
    pub submissions: Vec<(Metric, Submission)>,
    pub cleared: Vec<Metric>,
}

struct Shared {
    store: SampleStore,
    bounds: RwLock<Arc<Bounds>>,
    dispatcher: AlertDispatcher,
    ticks: AtomicU64,
    last_version: AtomicU64,
}

struct Running {
    shutdown: watch::Sender<bool>,
    sampler: JoinHandle<Sampler>,
    evaluator: JoinHandle<()>,
    forwarder: Option<JoinHandle<Forwarder>>,
}

/// Orchestrator owning the sampling and evaluation loops.
pub struct TelemetryPipeline {
    shared: Arc<Shared>,
    settings: PipelineSettings,
    sampler: Mutex<Option<Sampler>>,
    forwarder: Mutex<Option<Forwarder>>,
    forward_interval: Option<Duration>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for TelemetryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPipeline")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

impl TelemetryPipeline {
    /// Build a stopped pipeline. Evaluation reads from the sampler's store.
    pub fn new(
        sampler: Sampler,
        dispatcher: AlertDispatcher,
        bounds: Bounds,
        settings: PipelineSettings,
    ) -> Self {
        let shared = Shared {
            store: sampler.store().clone(),
            bounds: RwLock::new(Arc::new(bounds)),
            dispatcher,
            ticks: AtomicU64::new(0),
            last_version: AtomicU64::new(0),
        };
        Self {
            shared: Arc::new(shared),
            settings,
            sampler: Mutex::new(Some(sampler)),
            forwarder: Mutex::new(None),
            forward_interval: None,
            running: Mutex::new(None),
        }
    }

    /// Also upload the latest reading through `uplink` every `interval`
    /// while running. `timeout` bounds each upload.
    pub fn with_forwarder(
        mut self,
        uplink: Arc<dyn TelemetryUplink>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let forwarder = Forwarder::new(uplink, self.shared.store.clone(), timeout);
        *self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Some(forwarder);
        self.forward_interval = Some(interval);
        self
    }

    /// Spawn the sampling and evaluation loops, plus the forwarder if one
    /// is configured.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `MonitorError::AlreadyRunning` if the pipeline is already started
    /// - `MonitorError::Invariant` if the sampler was lost by a previous run
    ///   (its task panicked) or a concurrent `stop` has not returned it yet
    pub fn start(&self) -> Result<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let sampler = lock(&self.sampler).take().ok_or_else(|| {
            MonitorError::Invariant("sampler is not available to start".to_string())
        })?;

        let (shutdown, rx) = watch::channel(false);
        let sampler = tokio::spawn(sampler.run(self.settings.sample_interval, rx.clone()));
        let evaluator = tokio::spawn(evaluation_loop(
            Arc::clone(&self.shared),
            self.settings.evaluate_interval,
            rx.clone(),
        ));
        let forwarder = match (self.forward_interval, lock(&self.forwarder).take()) {
            (Some(period), Some(forwarder)) => Some(tokio::spawn(forwarder.run(period, rx))),
            (Some(_), None) => {
                warn!("Telemetry forwarder was lost by a previous run, not forwarding");
                None
            }
            _ => None,
        };

        *running = Some(Running {
            shutdown,
            sampler,
            evaluator,
            forwarder,
        });

        info!(
            "Telemetry pipeline started (sampling every {:?}, evaluating every {:?})",
            self.settings.sample_interval, self.settings.evaluate_interval
        );
        Ok(())
    }

    /// Stop the loops and drain in-flight deliveries.
    ///
    /// Returns the reports of the deliveries that were still in flight.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::NotRunning` if the pipeline is not started.
    pub async fn stop(&self) -> Result<Vec<DispatchReport>> {
        let running = lock(&self.running).take().ok_or(MonitorError::NotRunning)?;

        info!("Stopping telemetry pipeline...");
        // Receivers only go away when every loop has already exited
        let _ = running.shutdown.send(true);

        if let Err(e) = running.evaluator.await {
            error!("Evaluation task failed: {}", e);
        }

        match running.sampler.await {
            Ok(sampler) => *lock(&self.sampler) = Some(sampler),
            Err(e) => error!("Sampler task failed: {}", e),
        }

        if let Some(forwarder) = running.forwarder {
            match forwarder.await {
                Ok(forwarder) => *lock(&self.forwarder) = Some(forwarder),
                Err(e) => error!("Forwarder task failed: {}", e),
            }
        }

        let reports = self.shared.dispatcher.drain().await;
        info!(
            ticks = self.ticks(),
            drained = reports.len(),
            "Telemetry pipeline stopped"
        );
        Ok(reports)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Take one sample with the parked sampler.
    ///
    /// Lets callers drive the pipeline step by step without the loops.
    ///
    /// # Errors
    ///
    /// `MonitorError::AlreadyRunning` while the loops own the sampler,
    /// otherwise whatever [`Sampler::tick`] reports.
    pub async fn sample(&self) -> Result<Reading> {
        let mut sampler = lock(&self.sampler)
            .take()
            .ok_or(MonitorError::AlreadyRunning)?;
        let result = sampler.tick().await;
        *lock(&self.sampler) = Some(sampler);
        result
    }

    /// Run exactly one evaluation tick.
    ///
    /// Deliveries triggered by this tick start in the background; use
    /// [`drain`](Self::drain) to wait for them.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Invariant` if the stored reading cannot be
    /// evaluated; alert state is left untouched in that case.
    pub fn tick(&self) -> Result<TickReport> {
        self.shared.tick()
    }

    /// Wait for all background deliveries to resolve
    pub async fn drain(&self) -> Vec<DispatchReport> {
        self.shared.dispatcher.drain().await
    }

    /// Swap in a new set of bounds; the next tick uses them.
    pub fn reload_bounds(&self, bounds: Bounds) {
        *self
            .shared
            .bounds
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(bounds);
        info!("Safety bounds reloaded: {:?}", bounds);
    }

    /// Bounds currently in effect
    pub fn bounds(&self) -> Arc<Bounds> {
        self.shared.bounds()
    }

    /// Latest published reading, if any
    pub fn latest(&self) -> Option<Reading> {
        self.shared.store.get()
    }

    pub fn alert_states(&self) -> AlertStates {
        self.shared.dispatcher.states()
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.shared.dispatcher
    }

    /// Upload counters while stopped; `None` without a forwarder or while
    /// the forwarding loop owns it.
    pub fn forwarder_stats(&self) -> Option<ForwarderStats> {
        lock(&self.forwarder).as_ref().map(Forwarder::stats)
    }

    /// Evaluation ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }
}

impl Shared {
    fn bounds(&self) -> Arc<Bounds> {
        Arc::clone(&self.bounds.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn tick(&self) -> Result<TickReport> {
        let Some((version, reading)) = self.store.get_versioned() else {
            debug!("No telemetry yet, skipping evaluation");
            return Ok(TickReport::default());
        };

        let stale = self.last_version.swap(version, Ordering::Relaxed) == version;
        if stale {
            debug!("No new reading since last tick, re-evaluating reading #{}", version);
        }

        let bounds = self.bounds();
        let prior = self.dispatcher.states();
        let evaluation = evaluate(&reading, &bounds, &prior)?;

        for &metric in &evaluation.cleared {
            self.dispatcher
                .resolve(metric, reading.value(metric), reading.timestamp());
        }

        let submissions = evaluation
            .faults
            .iter()
            .map(|&event| (event.metric, self.dispatcher.submit(event)))
            .collect();

        self.ticks.fetch_add(1, Ordering::Relaxed);

        Ok(TickReport {
            reading: Some(reading),
            stale,
            faults: evaluation.faults,
            submissions,
            cleared: evaluation.cleared,
        })
    }
}

async fn evaluation_loop(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !*shutdown.borrow() {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            scheduled = ticker.tick() => {
                let lag = scheduled.elapsed();
                if lag >= period {
                    warn!("Evaluation running {:?} behind schedule, dropping missed ticks", lag);
                }
                // A failed tick is contained; the loop keeps going
                if let Err(e) = shared.tick() {
                    error!("Evaluation tick failed: {}", e);
                }
            }
        }
    }

    debug!("Evaluation loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
