//! Motion control.
//!
//! [`MotionController`] owns the three axis drivers, serializes move
//! requests, enforces travel limits before any hardware command, and
//! exposes the authoritative [`Position3D`]. At most one multi-axis move is
//! outstanding at a time; `stop_all` is always accepted.

use crate::config::ScannerConfig;
use crate::error::MotionError;
use crate::hal::{Axis, AxisDriver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Cartesian position snapshot, machine units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3D {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component along one axis.
    #[must_use]
    pub fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Published per-axis state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisState {
    pub axis: Axis,
    pub position: f64,
    pub is_moving: bool,
    pub at_min_limit: bool,
    pub at_max_limit: bool,
}

/// Serializes move requests against the three axis drivers.
pub struct MotionController {
    axes: [Arc<dyn AxisDriver>; 3],
    config: ScannerConfig,
    /// Makes the busy-check + command-issue sequence atomic so two callers
    /// cannot both win the one-outstanding-move slot. `stop_all` bypasses
    /// it: a stop is always accepted.
    cmd_lock: Mutex<()>,
    /// Position snapshots are composed while holding this write lock, so no
    /// read observes a torn update across axes.
    snapshot: RwLock<Position3D>,
}

impl MotionController {
    /// The drivers must be supplied in X, Y, Z order.
    #[must_use]
    pub fn new(axes: [Arc<dyn AxisDriver>; 3], config: ScannerConfig) -> Self {
        Self {
            axes,
            config,
            cmd_lock: Mutex::new(()),
            snapshot: RwLock::new(Position3D::default()),
        }
    }

    fn check_limits(&self, axis: Axis, target: f64) -> Result<(), MotionError> {
        let cfg = self.config.axis(axis);
        if target < cfg.min_travel || target > cfg.max_travel {
            return Err(MotionError::LimitExceeded {
                axis,
                target,
                min: cfg.min_travel,
                max: cfg.max_travel,
            });
        }
        Ok(())
    }

    /// Move all three axes to `target`.
    ///
    /// Rejects the whole request if any axis would exceed its travel limits
    /// (all-or-nothing, the first offending axis in X, Y, Z order is
    /// reported) or if a prior move is still in flight. Axis commands are
    /// issued concurrently; the call returns once they are issued and
    /// completion is observed via [`Self::wait_settled`].
    pub async fn move_absolute(&self, target: Position3D) -> Result<(), MotionError> {
        let _guard = self.cmd_lock.lock().await;
        if self.is_any_axis_moving().await {
            return Err(MotionError::Busy);
        }
        for axis in Axis::ALL {
            self.check_limits(axis, target.along(axis))?;
        }

        info!(x = target.x, y = target.y, z = target.z, "issuing absolute move");
        let [x, y, z] = &self.axes;
        tokio::try_join!(x.move_to(target.x), y.move_to(target.y), z.move_to(target.z))
            .map(|_| ())
            .map_err(MotionError::from)
    }

    /// Manual relative move of one axis.
    pub async fn jog(&self, axis: Axis, delta: f64) -> Result<(), MotionError> {
        let _guard = self.cmd_lock.lock().await;
        if self.is_any_axis_moving().await {
            return Err(MotionError::Busy);
        }
        let driver = &self.axes[axis.index()];
        let target = driver.position().await + delta;
        self.check_limits(axis, target)?;

        info!(axis = %axis, delta, target, "issuing jog");
        driver.move_to(target).await.map_err(MotionError::from)
    }

    /// Drive all axes back to the zero reference.
    pub async fn home(&self) -> Result<(), MotionError> {
        self.move_absolute(Position3D::default()).await
    }

    /// Consistent position snapshot.
    ///
    /// The three axis reads compose one snapshot under the write lock, so
    /// concurrent readers never interleave mid-composition.
    pub async fn position(&self) -> Position3D {
        let mut snapshot = self.snapshot.write().await;
        let [x, y, z] = &self.axes;
        *snapshot = Position3D::new(x.position().await, y.position().await, z.position().await);
        *snapshot
    }

    /// Per-axis state, composed under the same snapshot discipline as
    /// [`Self::position`].
    pub async fn axis_states(&self) -> Vec<AxisState> {
        let _guard = self.snapshot.write().await;
        let mut states = Vec::with_capacity(self.axes.len());
        for driver in &self.axes {
            let limits = driver.limit_state().await;
            states.push(AxisState {
                axis: driver.axis(),
                position: driver.position().await,
                is_moving: driver.is_moving().await,
                at_min_limit: limits.at_min,
                at_max_limit: limits.at_max,
            });
        }
        states
    }

    /// True while any axis from a prior request is still moving.
    pub async fn is_any_axis_moving(&self) -> bool {
        for driver in &self.axes {
            if driver.is_moving().await {
                return true;
            }
        }
        false
    }

    /// Halt every axis immediately. Always accepted regardless of
    /// controller state; idempotent.
    pub async fn stop_all(&self) {
        warn!("stop_all issued");
        for driver in &self.axes {
            driver.stop().await;
        }
    }

    /// Wait until all axes report idle, polling at the control interval.
    ///
    /// Unblocks within one control cycle after `stop_all`, since stopped
    /// axes report idle on the next poll. Fails with
    /// [`MotionError::SettleTimeout`] if motion does not complete in time.
    pub async fn wait_settled(&self, timeout: Duration) -> Result<(), MotionError> {
        let deadline = Instant::now() + timeout;
        while self.is_any_axis_moving().await {
            if Instant::now() >= deadline {
                return Err(MotionError::SettleTimeout);
            }
            sleep(self.config.scan.control_interval()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::drivers::sim::SimulatedAxis;

    fn fast_config() -> ScannerConfig {
        let axis = AxisConfig {
            min_travel: -100.0,
            max_travel: 100.0,
            max_speed: 400.0,
        };
        ScannerConfig {
            x: axis,
            y: axis,
            z: axis,
            scan: crate::config::ScanConfig {
                control_interval_ms: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn controller(cfg: &ScannerConfig) -> (MotionController, [Arc<SimulatedAxis>; 3]) {
        let x = Arc::new(SimulatedAxis::new(Axis::X, cfg.x));
        let y = Arc::new(SimulatedAxis::new(Axis::Y, cfg.y));
        let z = Arc::new(SimulatedAxis::new(Axis::Z, cfg.z));
        let motion = MotionController::new(
            [x.clone(), y.clone(), z.clone()],
            cfg.clone(),
        );
        (motion, [x, y, z])
    }

    #[tokio::test]
    async fn in_limit_move_reaches_target_within_tolerance() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        let target = Position3D::new(20.0, -15.0, 5.0);

        motion.move_absolute(target).await.unwrap();
        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();

        let position = motion.position().await;
        assert!((position.x - target.x).abs() < 1e-9);
        assert!((position.y - target.y).abs() < 1e-9);
        assert!((position.z - target.z).abs() < 1e-9);
    }

    #[tokio::test]
    async fn intermediate_reads_stay_within_travel() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        motion
            .move_absolute(Position3D::new(90.0, -90.0, 90.0))
            .await
            .unwrap();

        while motion.is_any_axis_moving().await {
            let position = motion.position().await;
            for axis in Axis::ALL {
                let value = position.along(axis);
                assert!(
                    (-100.0..=100.0).contains(&value),
                    "axis {axis} read {value} outside travel"
                );
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn out_of_limit_target_rejected_without_moving_any_axis() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);

        // Y is out of range, X and Z are fine.
        let err = motion
            .move_absolute(Position3D::new(50.0, 150.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MotionError::LimitExceeded { axis: Axis::Y, .. }
        ));

        assert!(!motion.is_any_axis_moving().await);
        assert_eq!(motion.position().await, Position3D::default());
    }

    #[tokio::test]
    async fn limit_tie_break_reports_first_axis_in_enumeration_order() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        let err = motion
            .move_absolute(Position3D::new(500.0, 500.0, 500.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MotionError::LimitExceeded { axis: Axis::X, .. }
        ));
    }

    #[tokio::test]
    async fn second_move_while_in_flight_is_busy_and_first_completes() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        let target = Position3D::new(80.0, 0.0, 0.0);

        motion.move_absolute(target).await.unwrap();
        let err = motion
            .move_absolute(Position3D::new(-10.0, 0.0, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err, MotionError::Busy);

        let err = motion.jog(Axis::Z, 1.0).await.unwrap_err();
        assert_eq!(err, MotionError::Busy);

        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();
        assert!((motion.position().await.x - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn jog_moves_one_axis_relative() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);

        motion.jog(Axis::Y, 12.5).await.unwrap();
        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();
        motion.jog(Axis::Y, -2.5).await.unwrap();
        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();

        let position = motion.position().await;
        assert!((position.y - 10.0).abs() < 1e-9);
        assert_eq!(position.x, 0.0);
    }

    #[tokio::test]
    async fn jog_past_limit_rejected() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        let err = motion.jog(Axis::X, 101.0).await.unwrap_err();
        assert!(matches!(
            err,
            MotionError::LimitExceeded { axis: Axis::X, .. }
        ));
    }

    #[tokio::test]
    async fn stop_all_unblocks_wait_settled_within_one_cycle() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        let motion = Arc::new(motion);

        motion
            .move_absolute(Position3D::new(90.0, 0.0, 0.0))
            .await
            .unwrap();

        let waiter = {
            let motion = Arc::clone(&motion);
            tokio::spawn(async move { motion.wait_settled(Duration::from_secs(10)).await })
        };

        sleep(Duration::from_millis(30)).await;
        motion.stop_all().await;

        let result = tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!motion.is_any_axis_moving().await);

        // Re-issue is idempotent.
        motion.stop_all().await;
    }

    #[tokio::test]
    async fn axis_fault_surfaces_as_axis_fault() {
        let cfg = fast_config();
        let (motion, [_, y, _]) = controller(&cfg);
        y.inject_fault();
        let err = motion
            .move_absolute(Position3D::new(1.0, 1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::AxisFault(_)));
    }

    #[tokio::test]
    async fn home_returns_all_axes_to_zero() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        motion
            .move_absolute(Position3D::new(30.0, 30.0, 30.0))
            .await
            .unwrap();
        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();

        motion.home().await.unwrap();
        motion
            .wait_settled(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(motion.position().await, Position3D::default());
    }

    #[tokio::test]
    async fn axis_states_report_motion_and_limits() {
        let cfg = fast_config();
        let (motion, _) = controller(&cfg);
        motion
            .move_absolute(Position3D::new(50.0, 0.0, 0.0))
            .await
            .unwrap();

        let states = motion.axis_states().await;
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].axis, Axis::X);
        assert!(states[0].is_moving);
        assert!(!states[0].at_min_limit && !states[0].at_max_limit);
    }
}
