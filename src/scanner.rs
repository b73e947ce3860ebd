//! Scanner facade.
//!
//! [`Scanner`] aggregates the motion controller, probe controller, and scan
//! engine behind the only surface the presentation layer consumes: a
//! command set (jog, move, home, stop, scan control) and a read set
//! (position, probe status, scan snapshot). Manual and automated motion are
//! mutually exclusive. No other mutation path is exposed.

use crate::config::ScannerConfig;
use crate::drivers::sim::{SimulatedAxis, SimulatedProbe};
use crate::error::{MotionError, ScanError, ScannerError};
use crate::hal::{Axis, AxisDriver, ProbeDriver};
use crate::motion::{AxisState, MotionController, Position3D};
use crate::probe::{ProbeController, ProbeStatus};
use crate::scan::{ScanEngine, ScanJob};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Unified read snapshot for the presentation layer to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerStatus {
    pub position: Position3D,
    pub probe: ProbeStatus,
    pub scan: ScanJob,
}

/// The scanner. One instance per physical machine.
pub struct Scanner {
    motion: Arc<MotionController>,
    probe: Arc<ProbeController>,
    engine: Arc<ScanEngine>,
    /// Makes each exclusion check atomic with its command issue, so exactly
    /// concurrent manual and scan commands cannot both pass their guards.
    /// Abort and stop paths never take it.
    cmd_gate: Mutex<()>,
}

impl Scanner {
    /// Build a scanner from validated configuration and device drivers.
    /// Axis drivers must be supplied in X, Y, Z order.
    pub fn new(
        config: ScannerConfig,
        axes: [Arc<dyn AxisDriver>; 3],
        probe_driver: Arc<dyn ProbeDriver>,
    ) -> Result<Self, ScannerError> {
        config.validate()?;
        let motion = Arc::new(MotionController::new(axes, config.clone()));
        let probe = Arc::new(ProbeController::new(probe_driver, config.probe));
        let engine = Arc::new(ScanEngine::new(
            Arc::clone(&motion),
            Arc::clone(&probe),
            config.scan,
        ));
        info!("scanner initialized");
        Ok(Self {
            motion,
            probe,
            engine,
            cmd_gate: Mutex::new(()),
        })
    }

    /// Scanner wired to simulated hardware.
    pub fn simulated(config: ScannerConfig) -> Result<Self, ScannerError> {
        let axes: [Arc<dyn AxisDriver>; 3] = [
            Arc::new(SimulatedAxis::new(Axis::X, config.x)),
            Arc::new(SimulatedAxis::new(Axis::Y, config.y)),
            Arc::new(SimulatedAxis::new(Axis::Z, config.z)),
        ];
        Self::new(config, axes, Arc::new(SimulatedProbe::new()))
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Manual relative move of one axis. Rejected while a scan is active.
    pub async fn jog(&self, axis: Axis, delta: f64) -> Result<(), MotionError> {
        let _gate = self.cmd_gate.lock().await;
        if self.engine.is_active().await {
            return Err(MotionError::Busy);
        }
        self.motion.jog(axis, delta).await
    }

    /// Manual absolute move. Rejected while a scan is active.
    pub async fn move_absolute(&self, target: Position3D) -> Result<(), MotionError> {
        let _gate = self.cmd_gate.lock().await;
        if self.engine.is_active().await {
            return Err(MotionError::Busy);
        }
        self.motion.move_absolute(target).await
    }

    /// Drive all axes to the zero reference. Rejected while a scan is
    /// active.
    pub async fn home(&self) -> Result<(), MotionError> {
        let _gate = self.cmd_gate.lock().await;
        if self.engine.is_active().await {
            return Err(MotionError::Busy);
        }
        self.motion.home().await
    }

    /// Halt all axes immediately. Always accepted.
    pub async fn stop_all(&self) {
        self.motion.stop_all().await;
    }

    /// Start an automated scan. Rejected while manual motion is in flight.
    pub async fn start_scan(&self, points: Vec<Position3D>) -> Result<(), ScanError> {
        let _gate = self.cmd_gate.lock().await;
        if self.motion.is_any_axis_moving().await {
            return Err(ScanError::MotionBusy);
        }
        self.engine.start(points).await
    }

    /// Request a scan pause; the in-flight point finishes first.
    pub async fn pause_scan(&self) -> Result<(), ScanError> {
        self.engine.pause().await
    }

    /// Resume a paused scan from its current point index.
    pub async fn resume_scan(&self) -> Result<(), ScanError> {
        self.engine.resume().await
    }

    /// Abort the scan and halt all motion. Idempotent.
    pub async fn abort_scan(&self) {
        self.engine.abort().await;
    }

    /// Abort any active scan, stop every axis, and leave the hardware
    /// safe. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.engine.abort().await;
        self.motion.stop_all().await;
        info!("scanner shut down");
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    /// Consistent position snapshot.
    pub async fn position(&self) -> Position3D {
        self.motion.position().await
    }

    /// Per-axis state including limit switches.
    pub async fn axis_states(&self) -> Vec<AxisState> {
        self.motion.axis_states().await
    }

    /// Probe state machine snapshot.
    pub async fn probe_status(&self) -> ProbeStatus {
        self.probe.status().await
    }

    /// Read-only copy of the current scan job.
    pub async fn scan_snapshot(&self) -> ScanJob {
        self.engine.snapshot().await
    }

    /// Unified snapshot of position, probe, and scan state.
    pub async fn status(&self) -> ScannerStatus {
        ScannerStatus {
            position: self.position().await,
            probe: self.probe_status().await,
            scan: self.scan_snapshot().await,
        }
    }
}
