//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; missing values fall back to the defaults below.
//! Validation runs once at load time so an inverted bound or a non-positive
//! interval is reported before monitoring starts, never mid-run.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::alert::{DispatcherSettings, RetryPolicy};
use crate::error::{MonitorError, Result};
use crate::fault::{Bounds, MetricBounds};
use crate::telemetry::PlausibleEnvelope;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub bounds: BoundsConfig,

    #[serde(default)]
    pub envelope: EnvelopeConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub forwarder: ForwarderConfig,
}

/// `{ min = .., max = .. }` pair as written in the config file
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RangeConfig {
    pub min: f64,
    pub max: f64,
}

impl RangeConfig {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Sampling and evaluation cadence
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub interval_secs: f64,

    #[serde(default = "default_evaluate_interval_secs")]
    pub evaluate_interval_secs: f64,
}

/// Safety bounds per metric
#[derive(Debug, Deserialize, Clone)]
pub struct BoundsConfig {
    #[serde(default = "default_voltage_bounds")]
    pub voltage: RangeConfig,

    #[serde(default = "default_current_bounds")]
    pub current: RangeConfig,

    #[serde(default = "default_temperature_bounds")]
    pub temperature: RangeConfig,
}

/// Plausible-value envelope used by the sampler to reject glitches
#[derive(Debug, Deserialize, Clone)]
pub struct EnvelopeConfig {
    #[serde(default = "default_voltage_envelope")]
    pub voltage: RangeConfig,

    #[serde(default = "default_current_envelope")]
    pub current: RangeConfig,

    #[serde(default = "default_temperature_envelope")]
    pub temperature: RangeConfig,
}

/// Notification retry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: f64,
}

/// Alert behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default)]
    pub notify_on_clear: bool,

    #[serde(default = "default_subject")]
    pub subject: String,
}

/// Notification channel selection
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
    Email,
}

/// Notification channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,

    /// Webhook endpoint
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub smtp_server: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub recipient: String,
}

/// Ranges for the simulated reading source
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_voltage_simulation")]
    pub voltage: RangeConfig,

    #[serde(default = "default_current_simulation")]
    pub current: RangeConfig,

    #[serde(default = "default_temperature_simulation")]
    pub temperature: RangeConfig,
}

/// Audit log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    #[serde(default = "default_audit_path")]
    pub path: String,
}

/// Application log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files. Empty = stdout only.
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

/// Upload of the latest reading to a remote collector
#[derive(Debug, Deserialize, Clone)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Collector URL receiving JSON readings
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_forward_interval_secs")]
    pub interval_secs: f64,

    #[serde(default = "default_forward_timeout_secs")]
    pub timeout_secs: f64,
}

// Default value functions
fn default_sample_interval_secs() -> f64 { 0.5 }
fn default_evaluate_interval_secs() -> f64 { 0.5 }

fn default_voltage_bounds() -> RangeConfig { RangeConfig::new(10.5, 12.5) }
fn default_current_bounds() -> RangeConfig { RangeConfig::new(1.5, 2.5) }
fn default_temperature_bounds() -> RangeConfig { RangeConfig::new(0.0, 30.0) }

fn default_voltage_envelope() -> RangeConfig { RangeConfig::new(0.0, 60.0) }
fn default_current_envelope() -> RangeConfig { RangeConfig::new(-200.0, 200.0) }
fn default_temperature_envelope() -> RangeConfig { RangeConfig::new(-60.0, 150.0) }

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_secs() -> f64 { 1.0 }
fn default_max_delay_secs() -> f64 { 30.0 }
fn default_send_timeout_secs() -> f64 { 10.0 }

fn default_subject() -> String { "Drone Fault Detected".to_string() }
fn default_smtp_port() -> u16 { 465 }

fn default_voltage_simulation() -> RangeConfig { RangeConfig::new(10.0, 13.0) }
fn default_current_simulation() -> RangeConfig { RangeConfig::new(1.5, 2.5) }
fn default_temperature_simulation() -> RangeConfig { RangeConfig::new(25.0, 35.0) }

fn default_audit_enabled() -> bool { true }
fn default_audit_path() -> String { "./logs/audit.jsonl".to_string() }
fn default_log_file_prefix() -> String { "fpv-power-monitor.log".to_string() }
fn default_forward_interval_secs() -> f64 { 0.5 }
fn default_forward_timeout_secs() -> f64 { 5.0 }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sample_interval_secs(),
            evaluate_interval_secs: default_evaluate_interval_secs(),
        }
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            voltage: default_voltage_bounds(),
            current: default_current_bounds(),
            temperature: default_temperature_bounds(),
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            voltage: default_voltage_envelope(),
            current: default_current_envelope(),
            temperature: default_temperature_envelope(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notify_on_clear: false,
            subject: default_subject(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            url: String::new(),
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            sender: String::new(),
            recipient: String::new(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            voltage: default_voltage_simulation(),
            current: default_current_simulation(),
            temperature: default_temperature_simulation(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: default_audit_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            file_prefix: default_log_file_prefix(),
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            interval_secs: default_forward_interval_secs(),
            timeout_secs: default_forward_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fpv_power_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        self.sample_interval()?;
        self.evaluate_interval()?;
        self.bounds()?;
        self.envelope()?;
        self.simulator_ranges()?;
        self.dispatcher_settings()?;

        match self.notifier.kind {
            NotifierKind::Log => {}
            NotifierKind::Webhook => {
                let url = &self.notifier.url;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(MonitorError::Config(
                        "notifier url must be an http(s) URL when kind = \"webhook\"".to_string(),
                    ));
                }
            }
            NotifierKind::Email => {
                for (name, value) in [
                    ("smtp_server", &self.notifier.smtp_server),
                    ("sender", &self.notifier.sender),
                    ("recipient", &self.notifier.recipient),
                ] {
                    if value.is_empty() {
                        return Err(MonitorError::Config(format!(
                            "notifier {} cannot be empty when kind = \"email\"",
                            name
                        )));
                    }
                }
                if self.notifier.smtp_port == 0 {
                    return Err(MonitorError::Config(
                        "smtp_port must be greater than 0".to_string(),
                    ));
                }
            }
        }

        if self.alerts.subject.trim().is_empty() {
            return Err(MonitorError::Config("alerts subject cannot be empty".to_string()));
        }

        if self.audit.enabled && self.audit.path.is_empty() {
            return Err(MonitorError::Config(
                "audit path cannot be empty when enabled".to_string(),
            ));
        }

        if !self.logging.dir.is_empty() && self.logging.file_prefix.is_empty() {
            return Err(MonitorError::Config(
                "logging file_prefix cannot be empty when dir is set".to_string(),
            ));
        }

        if self.forwarder.enabled {
            let endpoint = &self.forwarder.endpoint;
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(MonitorError::Config(
                    "forwarder endpoint must be an http(s) URL when enabled".to_string(),
                ));
            }
            self.forward_interval()?;
            self.forward_timeout()?;
        }

        Ok(())
    }

    /// Telemetry upload cadence (`forwarder.interval_secs`)
    pub fn forward_interval(&self) -> Result<Duration> {
        positive_secs("forwarder.interval_secs", self.forwarder.interval_secs)
    }

    /// Bound on a single telemetry upload (`forwarder.timeout_secs`)
    pub fn forward_timeout(&self) -> Result<Duration> {
        positive_secs("forwarder.timeout_secs", self.forwarder.timeout_secs)
    }

    /// Sampler cadence (`sampling.interval_secs`)
    pub fn sample_interval(&self) -> Result<Duration> {
        positive_secs("sampling.interval_secs", self.sampling.interval_secs)
    }

    /// Pipeline evaluation cadence (`sampling.evaluate_interval_secs`)
    pub fn evaluate_interval(&self) -> Result<Duration> {
        positive_secs(
            "sampling.evaluate_interval_secs",
            self.sampling.evaluate_interval_secs,
        )
    }

    /// Validated safety bounds
    pub fn bounds(&self) -> Result<Bounds> {
        to_bounds(
            "bounds",
            self.bounds.voltage,
            self.bounds.current,
            self.bounds.temperature,
        )
    }

    /// Validated plausible-value envelope
    pub fn envelope(&self) -> Result<PlausibleEnvelope> {
        to_bounds(
            "envelope",
            self.envelope.voltage,
            self.envelope.current,
            self.envelope.temperature,
        )
        .map(PlausibleEnvelope::new)
    }

    /// Validated simulator ranges
    pub fn simulator_ranges(&self) -> Result<Bounds> {
        to_bounds(
            "simulator",
            self.simulator.voltage,
            self.simulator.current,
            self.simulator.temperature,
        )
    }

    /// Dispatcher settings built from `[retry]` and `[alerts]`
    pub fn dispatcher_settings(&self) -> Result<DispatcherSettings> {
        let base_delay = positive_secs("retry.base_delay_secs", self.retry.base_delay_secs)?;
        let max_delay = positive_secs("retry.max_delay_secs", self.retry.max_delay_secs)?;
        let send_timeout =
            positive_secs("retry.send_timeout_secs", self.retry.send_timeout_secs)?;

        if base_delay > max_delay {
            return Err(MonitorError::Config(
                "retry.base_delay_secs must not exceed retry.max_delay_secs".to_string(),
            ));
        }

        Ok(DispatcherSettings {
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                base_delay,
                max_delay,
            },
            send_timeout,
            notify_on_clear: self.alerts.notify_on_clear,
            subject: self.alerts.subject.clone(),
        })
    }
}

fn positive_secs(name: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MonitorError::Config(format!(
            "{} must be a positive number of seconds (got {})",
            name, value
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| MonitorError::Config(format!("{} is out of range: {}", name, e)))
}

fn to_bounds(
    section: &str,
    voltage: RangeConfig,
    current: RangeConfig,
    temperature: RangeConfig,
) -> Result<Bounds> {
    let range = |name: &str, r: RangeConfig| {
        MetricBounds::new(r.min, r.max).map_err(|e| match e {
            MonitorError::Config(msg) => MonitorError::Config(format!("{}.{}: {}", section, name, msg)),
            other => other,
        })
    };

    Ok(Bounds {
        voltage: range("voltage", voltage)?,
        current: range("current", current)?,
        temperature: range("temperature", temperature)?,
    })
}
