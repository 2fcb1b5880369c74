//! # Audit Log
//!
//! Append-only JSONL record of everything needed to reconstruct alert
//! history offline:
//!
//! - one `sample` line per published reading
//! - one `rejected` line per reading the sampler refused to publish
//! - one `transition` line per alert state change
//! - one `dispatch` line per dispatch outcome
//!
//! ```text
//! {"kind":"sample","voltage":11.82,"current":2.07,"temperature":29.4,"timestamp":"2026-01-01T12:00:00Z"}
//! {"kind":"transition","metric":"voltage","from":"clear","to":"active","value":9.0,"at":"..."}
//! {"kind":"dispatch","metric":"voltage","notice":"fault","outcome":"delivered","attempts":1,"at":"..."}
//! ```
//!
//! The file is opened in append mode and never truncated. Write failures are
//! logged and otherwise ignored: a full disk must not stop monitoring.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::alert::{AlertPhase, DispatchOutcome, Notice};
use crate::error::Result;
use crate::fault::BoundViolated;
use crate::telemetry::{Metric, Reading};

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Sample {
        voltage: f64,
        current: f64,
        temperature: f64,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        reason: String,
        at: DateTime<Utc>,
    },
    Transition {
        metric: Metric,
        from: AlertPhase,
        to: AlertPhase,
        value: f64,
        at: DateTime<Utc>,
    },
    Dispatch {
        metric: Metric,
        notice: Notice,
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        side: Option<BoundViolated>,
        outcome: DispatchOutcome,
        attempts: u32,
        at: DateTime<Utc>,
    },
}

impl AuditRecord {
    pub fn sample(reading: &Reading) -> Self {
        Self::Sample {
            voltage: reading.voltage(),
            current: reading.current(),
            temperature: reading.temperature(),
            timestamp: reading.timestamp(),
        }
    }
}

/// Shared handle to the audit file. Cloning shares the same file.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    file: Option<Arc<Mutex<File>>>,
}

impl AuditLog {
    /// Open (or create) the audit file in append mode, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Io` if the directory or file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    /// An audit log that discards every record
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one record as a single line.
    pub fn record(&self, record: &AuditRecord) {
        let Some(file) = &self.file else {
            return;
        };

        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit record: {}", e);
                return;
            }
        };
        line.push('\n');

        // One write_all per line keeps lines whole even with concurrent writers.
        let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("Failed to append audit record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_records_are_appended_as_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/audit.jsonl");
        let log = AuditLog::open(&path).unwrap();

        let reading = Reading::new(11.8, 2.0, 28.5, Utc::now());
        log.record(&AuditRecord::sample(&reading));
        log.record(&AuditRecord::Transition {
            metric: Metric::Voltage,
            from: AlertPhase::Clear,
            to: AlertPhase::Active,
            value: 9.0,
            at: Utc::now(),
        });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "sample");
        assert_eq!(lines[0]["voltage"], 11.8);
        assert_eq!(lines[1]["kind"], "transition");
        assert_eq!(lines[1]["metric"], "voltage");
        assert_eq!(lines[1]["to"], "active");
    }

    #[test]
    fn test_reopen_does_not_truncate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let reading = Reading::new(11.0, 2.0, 25.0, Utc::now());
        AuditLog::open(&path).unwrap().record(&AuditRecord::sample(&reading));
        AuditLog::open(&path).unwrap().record(&AuditRecord::sample(&reading));

        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn test_dispatch_record_omits_missing_side() {
        let record = AuditRecord::Dispatch {
            metric: Metric::Current,
            notice: Notice::Clear,
            value: 2.0,
            side: None,
            outcome: DispatchOutcome::Delivered,
            attempts: 1,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["notice"], "clear");
        assert_eq!(json["outcome"], "delivered");
        assert!(json.get("side").is_none());
    }

    #[test]
    fn test_disabled_log_discards() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        log.record(&AuditRecord::Rejected {
            reason: "voltage is NaN".into(),
            at: Utc::now(),
        });
    }
}
