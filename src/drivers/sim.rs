//! Simulated hardware for tests and hardware-free development.
//!
//! Motion is interpolated in time at the configured speed, so callers
//! observe realistic in-flight positions and `is_moving` transitions
//! without physical actuators. Both devices support fault injection for
//! exercising error paths.

use crate::config::AxisConfig;
use crate::error::{AxisError, ProbeError};
use crate::hal::{Axis, AxisDriver, LimitState, ProbeDriver};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::debug;

/// Floor on simulated move duration so zero-length moves still exhibit a
/// brief moving phase, matching real stages that always report busy for at
/// least one status poll.
const MIN_MOVE_SECS: f64 = 0.005;

#[derive(Debug)]
struct AxisSim {
    start: f64,
    target: f64,
    started: Option<Instant>,
    duration: Duration,
}

impl AxisSim {
    fn at_rest(position: f64) -> Self {
        Self {
            start: position,
            target: position,
            started: None,
            duration: Duration::ZERO,
        }
    }

    /// Current interpolated position and whether the move is still running.
    fn sample(&self) -> (f64, bool) {
        let Some(started) = self.started else {
            return (self.target, false);
        };
        let total = self.duration.as_secs_f64();
        if total <= 0.0 {
            return (self.target, false);
        }
        let fraction = started.elapsed().as_secs_f64() / total;
        if fraction >= 1.0 {
            (self.target, false)
        } else {
            (self.start + (self.target - self.start) * fraction, true)
        }
    }
}

/// Simulated linear axis.
///
/// Moves at `max_speed` from the axis configuration and reports limit
/// switches at the travel bounds. [`SimulatedAxis::inject_fault`] makes the
/// next commanded move fail with a device fault.
pub struct SimulatedAxis {
    axis: Axis,
    cfg: AxisConfig,
    state: RwLock<AxisSim>,
    fault_next: AtomicBool,
}

impl SimulatedAxis {
    #[must_use]
    pub fn new(axis: Axis, cfg: AxisConfig) -> Self {
        Self {
            axis,
            cfg,
            state: RwLock::new(AxisSim::at_rest(0.0)),
            fault_next: AtomicBool::new(false),
        }
    }

    /// Make the next commanded move fail with [`AxisError::DeviceFault`].
    pub fn inject_fault(&self) {
        self.fault_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AxisDriver for SimulatedAxis {
    fn axis(&self) -> Axis {
        self.axis
    }

    async fn move_to(&self, target: f64) -> Result<(), AxisError> {
        if self.fault_next.swap(false, Ordering::SeqCst) {
            return Err(AxisError::DeviceFault {
                axis: self.axis,
                message: "simulated fault".into(),
            });
        }
        if target < self.cfg.min_travel || target > self.cfg.max_travel {
            return Err(AxisError::LimitExceeded {
                axis: self.axis,
                target,
                min: self.cfg.min_travel,
                max: self.cfg.max_travel,
            });
        }

        let mut state = self.state.write().await;
        let (current, _) = state.sample();
        let secs = ((target - current).abs() / self.cfg.max_speed).max(MIN_MOVE_SECS);
        debug!(axis = %self.axis, from = current, to = target, secs, "sim move issued");
        *state = AxisSim {
            start: current,
            target,
            started: Some(Instant::now()),
            duration: Duration::from_secs_f64(secs),
        };
        Ok(())
    }

    async fn stop(&self) {
        let mut state = self.state.write().await;
        let (current, moving) = state.sample();
        if moving {
            debug!(axis = %self.axis, at = current, "sim move halted");
        }
        *state = AxisSim::at_rest(current);
    }

    async fn position(&self) -> f64 {
        self.state.read().await.sample().0
    }

    async fn is_moving(&self) -> bool {
        self.state.read().await.sample().1
    }

    async fn limit_state(&self) -> LimitState {
        let (position, _) = self.state.read().await.sample();
        LimitState {
            at_min: position <= self.cfg.min_travel,
            at_max: position >= self.cfg.max_travel,
        }
    }
}

/// Simulated probe.
///
/// Delivers `base_reading` plus uniform noise after `measure_time`. Faults
/// can be scripted per fire index (1-based): a hung fire never reports, so
/// the controller timeout is exercised; a failed fire reports a device
/// fault. `fail_arming` makes every subsequent arm attempt fail, the
/// unrecoverable case.
pub struct SimulatedProbe {
    base_reading: f64,
    noise: f64,
    measure_time: Duration,
    arm_time: Duration,
    fires: AtomicU64,
    hang_on: Mutex<Vec<u64>>,
    fail_on: Mutex<Vec<u64>>,
    fail_arm: AtomicBool,
}

impl SimulatedProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_reading: 1.0,
            noise: 0.05,
            measure_time: Duration::from_millis(10),
            arm_time: Duration::ZERO,
            fires: AtomicU64::new(0),
            hang_on: Mutex::new(Vec::new()),
            fail_on: Mutex::new(Vec::new()),
            fail_arm: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_reading(mut self, base: f64, noise: f64) -> Self {
        self.base_reading = base;
        self.noise = noise.abs();
        self
    }

    #[must_use]
    pub fn with_measure_time(mut self, measure_time: Duration) -> Self {
        self.measure_time = measure_time;
        self
    }

    /// How long an arm command takes to acknowledge.
    #[must_use]
    pub fn with_arm_time(mut self, arm_time: Duration) -> Self {
        self.arm_time = arm_time;
        self
    }

    /// The nth fire (1-based) never reports a reading, forcing a timeout.
    pub fn hang_on_fire(&self, n: u64) {
        if let Ok(mut hang) = self.hang_on.lock() {
            hang.push(n);
        }
    }

    /// The nth fire (1-based) reports a device fault.
    pub fn fail_on_fire(&self, n: u64) {
        if let Ok(mut fail) = self.fail_on.lock() {
            fail.push(n);
        }
    }

    /// Every subsequent arm attempt fails with a device fault.
    pub fn fail_arming(&self) {
        self.fail_arm.store(true, Ordering::SeqCst);
    }

    /// Total fires commanded so far.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    fn scripted(&self, list: &Mutex<Vec<u64>>, n: u64) -> bool {
        list.lock().map(|v| v.contains(&n)).unwrap_or(false)
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeDriver for SimulatedProbe {
    async fn arm(&self) -> Result<(), ProbeError> {
        if self.fail_arm.load(Ordering::SeqCst) {
            return Err(ProbeError::DeviceFault("simulated arm failure".into()));
        }
        if !self.arm_time.is_zero() {
            sleep(self.arm_time).await;
        }
        Ok(())
    }

    async fn fire(&self) -> Result<f64, ProbeError> {
        let n = self.fires.fetch_add(1, Ordering::SeqCst) + 1;
        if self.scripted(&self.hang_on, n) {
            debug!(fire = n, "sim probe hanging, controller timeout will fire");
            sleep(Duration::from_secs(86_400)).await;
        }
        if self.scripted(&self.fail_on, n) {
            return Err(ProbeError::DeviceFault("simulated probe fault".into()));
        }
        sleep(self.measure_time).await;
        let noise = if self.noise > 0.0 {
            rand::thread_rng().gen_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        Ok(self.base_reading + noise)
    }
}
