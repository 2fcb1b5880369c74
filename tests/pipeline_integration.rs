//! End-to-end tests driving the monitor through its public API.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fpv_power_monitor::alert::{
    AlertDispatcher, AlertMessage, DispatchOutcome, DispatcherSettings, NotificationSink,
    RetryPolicy, Submission,
};
use fpv_power_monitor::audit::AuditLog;
use fpv_power_monitor::config::Config;
use fpv_power_monitor::error::{MonitorError, Result};
use fpv_power_monitor::pipeline::{PipelineSettings, TelemetryPipeline};
use fpv_power_monitor::telemetry::{
    Metric, Reading, ReadingSource, SampleStore, Sampler, TelemetryUplink,
};

/// Source replaying fixed (voltage, current, temperature) triples.
struct Replay {
    readings: VecDeque<(f64, f64, f64)>,
    last: (f64, f64, f64),
}

impl Replay {
    fn new(readings: &[(f64, f64, f64)]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            last: readings[0],
        }
    }
}

#[async_trait]
impl ReadingSource for Replay {
    fn name(&self) -> &str {
        "replay"
    }

    async fn read(&mut self) -> Result<Reading> {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        let (v, c, t) = self.last;
        Ok(Reading::new(v, c, t, Utc::now()))
    }
}

/// Sink that fails the first `failures` sends, then records messages.
#[derive(Default)]
struct Outbox {
    failures: Mutex<u32>,
    sent: Mutex<Vec<AlertMessage>>,
}

impl Outbox {
    fn failing_first(failures: u32) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for Outbox {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(MonitorError::Notify("503 Service Unavailable".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Collector that records every uploaded reading.
#[derive(Default)]
struct Collector {
    received: Mutex<Vec<Reading>>,
}

#[async_trait]
impl TelemetryUplink for Collector {
    async fn post(&self, reading: &Reading) -> Result<()> {
        self.received.lock().unwrap().push(*reading);
        Ok(())
    }
}

fn build(config: &Config, readings: &[(f64, f64, f64)], sink: Arc<Outbox>, audit: AuditLog) -> TelemetryPipeline {
    let sampler = Sampler::new(
        Box::new(Replay::new(readings)),
        SampleStore::new(),
        config.envelope().unwrap(),
        audit.clone(),
    );
    let dispatcher = AlertDispatcher::new(sink, config.dispatcher_settings().unwrap(), audit);
    let settings = PipelineSettings {
        sample_interval: config.sample_interval().unwrap(),
        evaluate_interval: config.evaluate_interval().unwrap(),
    };
    TelemetryPipeline::new(sampler, dispatcher, config.bounds().unwrap(), settings)
}

#[tokio::test(start_paused = true)]
async fn test_default_config_scenario() {
    let config = Config::default();
    let sink = Arc::new(Outbox::default());
    let pipeline = build(
        &config,
        &[(9.0, 2.0, 20.0), (11.0, 2.0, 20.0), (13.0, 2.0, 20.0)],
        sink.clone(),
        AuditLog::disabled(),
    );

    for _ in 0..3 {
        pipeline.sample().await.unwrap();
        pipeline.tick().unwrap();
        pipeline.drain().await;
    }

    let sent = sink.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, "Drone Fault Detected");
    assert!(sent[0].body.contains("9.00 V"));
    assert!(sent[1].body.contains("13.00 V"));
    assert!(pipeline.alert_states().get(Metric::Voltage).is_active());
}

#[tokio::test(start_paused = true)]
async fn test_transient_sink_failure_is_retried() {
    let config = Config::from_toml(
        r#"
        [retry]
        max_attempts = 4
        base_delay_secs = 1.0
        max_delay_secs = 2.0
        "#,
    )
    .unwrap();
    let sink = Arc::new(Outbox::failing_first(2));
    let pipeline = build(&config, &[(11.0, 2.0, 45.0)], sink.clone(), AuditLog::disabled());

    pipeline.sample().await.unwrap();
    let report = pipeline.tick().unwrap();
    assert_eq!(report.submissions, vec![(Metric::Temperature, Submission::Queued)]);

    let drained = pipeline.drain().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].outcome, DispatchOutcome::Delivered);
    assert_eq!(drained[0].attempts, 3);
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_running_pipeline_writes_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let audit = AuditLog::open(&path).unwrap();

    let config = Config::from_toml(
        r#"
        [sampling]
        interval_secs = 0.1
        evaluate_interval_secs = 0.1
        "#,
    )
    .unwrap();
    let sink = Arc::new(Outbox::default());
    let pipeline = build(&config, &[(11.0, 2.0, 20.0), (11.0, 3.1, 20.0)], sink.clone(), audit);

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    pipeline.stop().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let kinds: Vec<String> = contents
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect();

    assert!(kinds.iter().filter(|k| *k == "sample").count() >= 4);
    assert_eq!(kinds.iter().filter(|k| *k == "transition").count(), 1);
    assert!(kinds.iter().any(|k| k == "dispatch"));
    assert_eq!(sink.sent().len(), 1);
    assert!(sink.sent()[0].body.contains("current"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_notice_when_enabled() {
    let config = Config::default();
    let settings = DispatcherSettings {
        notify_on_clear: true,
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        ..config.dispatcher_settings().unwrap()
    };
    let sink = Arc::new(Outbox::default());
    let sampler = Sampler::new(
        Box::new(Replay::new(&[(11.0, 2.0, 31.0), (11.0, 2.0, 29.0)])),
        SampleStore::new(),
        config.envelope().unwrap(),
        AuditLog::disabled(),
    );
    let pipeline = TelemetryPipeline::new(
        sampler,
        AlertDispatcher::new(sink.clone(), settings, AuditLog::disabled()),
        config.bounds().unwrap(),
        PipelineSettings {
            sample_interval: Duration::from_millis(500),
            evaluate_interval: Duration::from_millis(500),
        },
    );

    pipeline.sample().await.unwrap();
    pipeline.tick().unwrap();
    pipeline.drain().await;

    pipeline.sample().await.unwrap();
    let report = pipeline.tick().unwrap();
    assert_eq!(report.cleared, vec![Metric::Temperature]);
    let drained = pipeline.drain().await;
    assert_eq!(drained.len(), 1);

    let sent = sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].subject.contains("back to normal"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_retry_leaves_nothing_pending() {
    let config = Config::from_toml(
        r#"
        [sampling]
        interval_secs = 0.1
        evaluate_interval_secs = 0.1

        [retry]
        max_attempts = 3
        base_delay_secs = 5.0
        max_delay_secs = 5.0
        "#,
    )
    .unwrap();
    let sink = Arc::new(Outbox::failing_first(1));
    let pipeline = build(&config, &[(11.0, 1.0, 20.0)], sink.clone(), AuditLog::disabled());

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(pipeline.dispatcher().in_flight(), 1);

    let reports = pipeline.stop().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, DispatchOutcome::Delivered);
    assert_eq!(reports[0].attempts, 2);
    assert_eq!(pipeline.dispatcher().in_flight(), 0);
    assert_eq!(sink.sent().len(), 1);
    assert!(pipeline.drain().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_forwarder_uploads_latest_readings() {
    let config = Config::from_toml(
        r#"
        [sampling]
        interval_secs = 0.2
        evaluate_interval_secs = 0.2

        [forwarder]
        enabled = true
        endpoint = "http://collector.local/telemetry"
        interval_secs = 0.1
        "#,
    )
    .unwrap();
    let collector = Arc::new(Collector::default());
    let pipeline = build(
        &config,
        &[(11.0, 2.0, 20.0), (11.5, 2.1, 21.0)],
        Arc::new(Outbox::default()),
        AuditLog::disabled(),
    )
    .with_forwarder(
        collector.clone(),
        config.forward_interval().unwrap(),
        config.forward_timeout().unwrap(),
    );

    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_millis(650)).await;
    pipeline.stop().await.unwrap();

    let received = collector.received.lock().unwrap().clone();
    assert!(received.len() >= 4);
    assert_eq!(received.last().unwrap().voltage(), 11.5);
    assert_eq!(pipeline.latest().unwrap().voltage(), 11.5);
    assert_eq!(pipeline.forwarder_stats().unwrap().failed, 0);
}
