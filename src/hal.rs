//! Hardware abstraction layer.
//!
//! Defines the capability traits device drivers implement. The controllers
//! never talk to hardware any other way, so a driver for real hardware and
//! the simulated drivers in [`crate::drivers::sim`] are interchangeable.
//!
//! # Contract
//!
//! All methods are async and take `&self`; drivers use interior mutability
//! for state. Move and fire commands may complete asynchronously: the
//! driver returns once the command is issued and completion is observed by
//! polling (`is_moving`) or by the command resolving with a reading.

use crate::error::{AxisError, ProbeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One independently motorized linear degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in enumeration order. Validation reports the first
    /// offending axis in this order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index into per-axis arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Limit-switch state of a single axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitState {
    pub at_min: bool,
    pub at_max: bool,
}

/// Capability: a single motorized axis.
///
/// `move_to` initiates motion and returns once the command is issued;
/// completion is observed via `is_moving`. Position is in machine units.
#[async_trait]
pub trait AxisDriver: Send + Sync {
    /// Which axis this driver controls.
    fn axis(&self) -> Axis;

    /// Command an absolute move. Returns once the command is issued.
    ///
    /// Fails with [`AxisError::LimitExceeded`] when the target lies outside
    /// the configured travel bounds, [`AxisError::DeviceFault`] when the
    /// hardware reports a fault.
    async fn move_to(&self, target: f64) -> Result<(), AxisError>;

    /// Halt motion immediately. Always safe to call; a no-op when idle.
    async fn stop(&self);

    /// Current position in machine units. May be mid-travel while moving.
    async fn position(&self) -> f64;

    /// True only between command-issued and move-complete.
    async fn is_moving(&self) -> bool;

    /// Limit-switch state.
    async fn limit_state(&self) -> LimitState;
}

/// Capability: the sampling probe.
///
/// The device protocol is arm → fire → reading. The driver resolves `fire`
/// with the reading once the hardware delivers it; the controller applies
/// the timeout.
#[async_trait]
pub trait ProbeDriver: Send + Sync {
    /// Prepare the probe for a trigger.
    async fn arm(&self) -> Result<(), ProbeError>;

    /// Trigger the probe and wait for the hardware to report a reading.
    async fn fire(&self) -> Result<f64, ProbeError>;
}
