//! Error types for the scanner core.
//!
//! Each controller surfaces its own typed error so callers can match on the
//! exact failure. [`ScannerError`] is the top-level type used by
//! configuration loading and facade construction; it converts from all of
//! the controller errors via `#[from]`.
//!
//! During an automated scan, per-point faults are recorded on the
//! [`ScanPoint`](crate::scan::ScanPoint) and do not abort the job; only an
//! explicit abort or an unrecoverable probe fault halts the whole job.

use crate::hal::Axis;
use thiserror::Error;

/// Errors reported by a single axis driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AxisError {
    /// Commanded target lies outside the configured travel bounds.
    #[error("axis {axis}: target {target} outside travel range [{min}, {max}]")]
    LimitExceeded {
        axis: Axis,
        target: f64,
        min: f64,
        max: f64,
    },

    /// The hardware reported a fault. Also raised when a limit switch is
    /// hit physically mid-move; operator intervention is required.
    #[error("axis {axis}: device fault: {message}")]
    DeviceFault { axis: Axis, message: String },
}

/// Errors reported by the motion controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    /// A prior multi-axis move is still in flight. At most one outstanding
    /// move is accepted at a time.
    #[error("a motion command is already in flight")]
    Busy,

    /// Pre-validation rejected the request; no axis was commanded.
    #[error("axis {axis}: target {target} outside travel range [{min}, {max}]")]
    LimitExceeded {
        axis: Axis,
        target: f64,
        min: f64,
        max: f64,
    },

    /// An axis driver faulted while issuing the command.
    #[error("axis fault: {0}")]
    AxisFault(#[from] AxisError),

    /// Motion did not complete within the configured move timeout.
    #[error("motion did not settle within the configured timeout")]
    SettleTimeout,
}

/// Errors reported by the probe controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// A fire/read cycle is already in progress. The request is not queued.
    #[error("probe is busy with an in-progress fire/read cycle")]
    AlreadyBusy,

    /// `fire_and_read` was called without arming first.
    #[error("probe is not armed")]
    NotArmed,

    /// The hardware did not deliver a reading within the configured
    /// timeout. The probe enters the Faulted state; re-arm to recover.
    #[error("probe timed out waiting for a reading")]
    Timeout,

    /// The acquisition was cancelled before the hardware reported a
    /// reading. The probe returns to Idle and can be re-armed immediately.
    #[error("probe acquisition interrupted")]
    Interrupted,

    /// The probe hardware reported a fault.
    #[error("probe device fault: {0}")]
    DeviceFault(String),
}

/// Errors reported by the scan engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A scan job is already running or paused.
    #[error("a scan job is already running")]
    AlreadyRunning,

    /// The submitted plan contains no points.
    #[error("scan plan contains no points")]
    EmptyPlan,

    /// Manual motion is in flight; manual and automated motion are
    /// mutually exclusive.
    #[error("manual motion is in flight")]
    MotionBusy,

    /// `pause` was called while no job was running.
    #[error("no scan job is running")]
    NotRunning,

    /// `resume` was called while no job was paused.
    #[error("scan job is not paused")]
    NotPaused,
}

/// Top-level error type for scanner construction and configuration.
#[derive(Error, Debug)]
pub enum ScannerError {
    /// Configuration file parsing failed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation (inverted
    /// travel range, non-positive speed or timeout).
    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}
