//! # Alert Module
//!
//! Turns fault events into notifications.
//!
//! This module handles:
//! - Per-metric alert state (Clear/Active) for de-duplication
//! - Delivering notifications through a pluggable sink
//! - Bounded exponential retry of failed deliveries
//! - Concrete sinks: application log, webhook, e-mail

pub mod dispatcher;
pub mod email;
pub mod retry;
pub mod sink;
pub mod state;
pub mod webhook;

pub use dispatcher::{
    AlertDispatcher, DispatchOutcome, DispatchReport, DispatcherSettings, Notice, Submission,
};
pub use retry::RetryPolicy;
pub use sink::{build_sink, AlertMessage, LogSink, NotificationSink};
pub use state::{AlertPhase, AlertState, AlertStates};
