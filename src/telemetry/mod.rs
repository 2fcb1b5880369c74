//! # Telemetry Module
//!
//! Acquisition side of the monitor.
//!
//! This module handles:
//! - Representing one timestamped power reading ([`Reading`])
//! - Holding the latest reading for concurrent readers ([`SampleStore`])
//! - Abstracting where readings come from ([`ReadingSource`])
//! - Periodically sampling, validating and publishing readings ([`Sampler`])
//! - Uploading the latest reading to a remote collector ([`Forwarder`])

pub mod forwarder;
pub mod reading;
pub mod sampler;
pub mod source;
pub mod store;

pub use forwarder::{Forwarder, ForwarderStats, HttpUplink, TelemetryUplink};
pub use reading::{Metric, Reading};
pub use sampler::{PlausibleEnvelope, Sampler};
pub use source::{ReadingSource, SimulatedSource};
pub use store::SampleStore;
