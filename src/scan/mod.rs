//! Automated scan execution.
//!
//! [`ScanEngine`] orchestrates the motion and probe controllers to execute
//! a sequence of sample points: move, settle, probe, record. A fault on one
//! point marks that point Failed and the scan continues; only an explicit
//! abort or an unrecoverable probe fault halts the whole job.
//!
//! # State machine
//!
//! ```text
//! ┌──────┐  start()  ┌─────────┐  all points terminal  ┌───────────┐
//! │ Idle │──────────▶│ Running │──────────────────────▶│ Completed │
//! └──────┘           └─┬─────▲─┘                       └───────────┘
//!                pause()│     │resume()
//!                      ▼     │
//!                   ┌────────┴┐        abort()        ┌─────────┐
//!                   │ Paused  │──────────────────────▶│ Aborted │
//!                   └─────────┘  (also from Running)  └─────────┘
//! ```
//!
//! Completed and Aborted are terminal; a new `start()` is required to run
//! again. Each `start()` supersedes any prior job's worker: every job
//! carries a generation, and a worker only mutates state belonging to its
//! own generation. `abort()` additionally interrupts an in-flight probe
//! acquisition, so the worker never waits out the probe timeout.

pub mod plans;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::motion::{MotionController, Position3D};
use crate::probe::ProbeController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Lifecycle of one planned sample point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Pending,
    Moved,
    Probed,
    Failed,
}

impl PointStatus {
    /// Probed and Failed are final; such a point is never rewritten.
    fn is_terminal(self) -> bool {
        matches!(self, PointStatus::Probed | PointStatus::Failed)
    }
}

/// One planned (position, probe-reading) sample. Immutable once Probed or
/// Failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub target: Position3D,
    pub recorded_value: Option<f64>,
    pub status: PointStatus,
}

impl ScanPoint {
    fn new(target: Position3D) -> Self {
        Self {
            target,
            recorded_value: None,
            status: PointStatus::Pending,
        }
    }
}

/// Overall job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ScanStatus::Idle => "idle",
            ScanStatus::Running => "running",
            ScanStatus::Paused => "paused",
            ScanStatus::Completed => "completed",
            ScanStatus::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Ordered point sequence plus progress. Observers receive cloned
/// snapshots; the engine exclusively owns the live job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub points: Vec<ScanPoint>,
    pub current_index: usize,
    pub status: ScanStatus,
}

impl ScanJob {
    fn idle() -> Self {
        Self {
            points: Vec::new(),
            current_index: 0,
            status: ScanStatus::Idle,
        }
    }
}

impl Default for ScanJob {
    fn default() -> Self {
        Self::idle()
    }
}

/// Live job plus the bookkeeping that fences workers.
struct JobState {
    job: ScanJob,
    /// Bumped by every `start()`. A worker only mutates state carrying its
    /// own generation, so a superseded worker cannot touch the new job.
    generation: u64,
    /// True from the moment the worker picks a point up until its outcome
    /// is recorded. `abort()` only fails the current point when set; a
    /// never-started point stays Pending.
    point_in_flight: bool,
}

/// Shared between the engine handle and the spawned execution task.
struct ScanShared {
    state: RwLock<JobState>,
    pause_requested: RwLock<bool>,
    abort_requested: RwLock<bool>,
    /// Wakes the in-flight probe acquisition on abort. Replaced per job so
    /// a stale permit cannot cancel the next job's first reading.
    probe_cancel: RwLock<Arc<Notify>>,
}

/// Executes scan jobs against the motion and probe controllers.
pub struct ScanEngine {
    motion: Arc<MotionController>,
    probe: Arc<ProbeController>,
    config: ScanConfig,
    shared: Arc<ScanShared>,
}

impl ScanEngine {
    #[must_use]
    pub fn new(
        motion: Arc<MotionController>,
        probe: Arc<ProbeController>,
        config: ScanConfig,
    ) -> Self {
        Self {
            motion,
            probe,
            config,
            shared: Arc::new(ScanShared {
                state: RwLock::new(JobState {
                    job: ScanJob::idle(),
                    generation: 0,
                    point_in_flight: false,
                }),
                pause_requested: RwLock::new(false),
                abort_requested: RwLock::new(false),
                probe_cancel: RwLock::new(Arc::new(Notify::new())),
            }),
        }
    }

    /// Plan and start a scan over `targets`, executed on a spawned task.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] while a job is Running or
    /// Paused, [`ScanError::EmptyPlan`] for an empty target list.
    pub async fn start(&self, targets: Vec<Position3D>) -> Result<(), ScanError> {
        if targets.is_empty() {
            return Err(ScanError::EmptyPlan);
        }
        let generation = {
            // Check and claim under one write lock so concurrent starts
            // cannot both win. Bumping the generation here fences any
            // worker left over from a previous job.
            let mut state = self.shared.state.write().await;
            if matches!(state.job.status, ScanStatus::Running | ScanStatus::Paused) {
                return Err(ScanError::AlreadyRunning);
            }
            state.generation += 1;
            state.point_in_flight = false;
            state.job = ScanJob {
                points: targets.into_iter().map(ScanPoint::new).collect(),
                current_index: 0,
                status: ScanStatus::Running,
            };
            state.generation
        };
        *self.shared.pause_requested.write().await = false;
        *self.shared.abort_requested.write().await = false;
        let cancel = Arc::new(Notify::new());
        *self.shared.probe_cancel.write().await = Arc::clone(&cancel);

        let worker = ScanWorker {
            motion: Arc::clone(&self.motion),
            probe: Arc::clone(&self.probe),
            config: self.config,
            shared: Arc::clone(&self.shared),
            generation,
            cancel,
        };
        info!(points = worker.point_count(), "scan started");
        tokio::spawn(async move { worker.run().await });
        Ok(())
    }

    /// Request a pause. The in-flight point finishes before the job halts.
    pub async fn pause(&self) -> Result<(), ScanError> {
        if self.shared.state.read().await.job.status != ScanStatus::Running {
            return Err(ScanError::NotRunning);
        }
        info!("scan pause requested");
        *self.shared.pause_requested.write().await = true;
        Ok(())
    }

    /// Resume from a pause, continuing from the current point index. Also
    /// cancels a pause that has not yet taken effect.
    pub async fn resume(&self) -> Result<(), ScanError> {
        let status = self.shared.state.read().await.job.status;
        let pause_pending = *self.shared.pause_requested.read().await;
        if status != ScanStatus::Paused && !(status == ScanStatus::Running && pause_pending) {
            return Err(ScanError::NotPaused);
        }
        info!("scan resumed");
        *self.shared.pause_requested.write().await = false;
        Ok(())
    }

    /// Abort the job: halts all motion immediately, interrupts an in-flight
    /// probe acquisition, marks the in-flight point Failed, and sets the
    /// job status to Aborted. A point that never started stays Pending.
    /// Idempotent; a no-op when no job is active.
    pub async fn abort(&self) {
        *self.shared.abort_requested.write().await = true;
        {
            let mut state = self.shared.state.write().await;
            if !matches!(state.job.status, ScanStatus::Running | ScanStatus::Paused) {
                return;
            }
            state.job.status = ScanStatus::Aborted;
            if state.point_in_flight {
                let index = state.job.current_index;
                if let Some(point) = state.job.points.get_mut(index) {
                    if !point.status.is_terminal() {
                        point.status = PointStatus::Failed;
                    }
                }
            }
        }
        self.shared.probe_cancel.read().await.notify_one();
        self.motion.stop_all().await;
        warn!("scan aborted");
    }

    /// Read-only copy of the job for observers.
    pub async fn snapshot(&self) -> ScanJob {
        self.shared.state.read().await.job.clone()
    }

    /// True while a job is Running or Paused.
    pub async fn is_active(&self) -> bool {
        matches!(
            self.shared.state.read().await.job.status,
            ScanStatus::Running | ScanStatus::Paused
        )
    }
}

enum PointOutcome {
    Probed(f64),
    Failed,
    /// Unrecoverable probe fault: halt the whole job.
    Fatal,
}

/// Owns the execution loop of one job on its spawned task.
struct ScanWorker {
    motion: Arc<MotionController>,
    probe: Arc<ProbeController>,
    config: ScanConfig,
    shared: Arc<ScanShared>,
    /// The job generation this worker belongs to.
    generation: u64,
    /// Fired by `abort()` to interrupt a pending probe acquisition.
    cancel: Arc<Notify>,
}

impl ScanWorker {
    fn point_count(&self) -> usize {
        // Only called right after the job is planned; a blocked read here
        // would mean the state lock is held across an await, which it never
        // is.
        self.shared
            .state
            .try_read()
            .map(|state| state.job.points.len())
            .unwrap_or(0)
    }

    /// True once this worker's job has been aborted or superseded by a
    /// newer `start()`.
    async fn cancelled(&self) -> bool {
        if *self.shared.abort_requested.read().await {
            return true;
        }
        self.shared.state.read().await.generation != self.generation
    }

    async fn run(&self) {
        loop {
            // abort() already finalized the job and stopped motion; a newer
            // start() owns the state now.
            if self.cancelled().await {
                return;
            }

            // Pause takes effect between points, after the in-flight point
            // finished.
            if *self.shared.pause_requested.read().await {
                self.hold_while_paused().await;
                if self.cancelled().await {
                    return;
                }
            }

            let Some((index, target)) = self.next_pending().await else {
                break;
            };

            let outcome = self.execute_point(index, target).await;
            if self.cancelled().await {
                // abort() marked the in-flight point; discard the outcome.
                return;
            }
            self.record_outcome(index, &outcome).await;

            if matches!(outcome, PointOutcome::Fatal) {
                self.motion.stop_all().await;
                error!(index, "unrecoverable probe fault, scan halted");
                return;
            }
        }

        let mut state = self.shared.state.write().await;
        if state.generation == self.generation && state.job.status == ScanStatus::Running {
            state.job.status = ScanStatus::Completed;
            let probed = state
                .job
                .points
                .iter()
                .filter(|p| p.status == PointStatus::Probed)
                .count();
            info!(
                probed,
                failed = state.job.points.len() - probed,
                "scan completed"
            );
        }
    }

    async fn hold_while_paused(&self) {
        {
            let mut state = self.shared.state.write().await;
            if state.generation == self.generation && state.job.status == ScanStatus::Running {
                state.job.status = ScanStatus::Paused;
                info!(index = state.job.current_index, "scan paused");
            }
        }
        loop {
            sleep(self.config.control_interval()).await;
            if self.cancelled().await {
                return;
            }
            if !*self.shared.pause_requested.read().await {
                break;
            }
        }
        let mut state = self.shared.state.write().await;
        if state.generation == self.generation && state.job.status == ScanStatus::Paused {
            state.job.status = ScanStatus::Running;
        }
    }

    /// Picks the next point and marks it in flight, so `abort()` knows
    /// whether the current point actually started.
    async fn next_pending(&self) -> Option<(usize, Position3D)> {
        let mut state = self.shared.state.write().await;
        if state.generation != self.generation {
            return None;
        }
        let index = state.job.current_index;
        let next = state.job.points.get(index).map(|point| (index, point.target));
        state.point_in_flight = next.is_some();
        next
    }

    async fn record_outcome(&self, index: usize, outcome: &PointOutcome) {
        let mut state = self.shared.state.write().await;
        if state.generation != self.generation {
            return;
        }
        if let Some(point) = state.job.points.get_mut(index) {
            if !point.status.is_terminal() {
                match outcome {
                    PointOutcome::Probed(value) => {
                        point.status = PointStatus::Probed;
                        point.recorded_value = Some(*value);
                    }
                    PointOutcome::Failed | PointOutcome::Fatal => {
                        point.status = PointStatus::Failed;
                    }
                }
            }
        }
        state.job.current_index = index + 1;
        state.point_in_flight = false;
        if matches!(outcome, PointOutcome::Fatal) {
            state.job.status = ScanStatus::Aborted;
        }
    }

    async fn execute_point(&self, index: usize, target: Position3D) -> PointOutcome {
        debug!(index, x = target.x, y = target.y, z = target.z, "scan point");

        if let Err(err) = self.motion.move_absolute(target).await {
            warn!(index, error = %err, "move failed, point marked failed");
            return PointOutcome::Failed;
        }
        if let Err(err) = self.motion.wait_settled(self.config.move_timeout()).await {
            warn!(index, error = %err, "motion did not settle");
            return PointOutcome::Failed;
        }
        if self.cancelled().await {
            return PointOutcome::Failed;
        }

        {
            let mut state = self.shared.state.write().await;
            if state.generation == self.generation {
                if let Some(point) = state.job.points.get_mut(index) {
                    point.status = PointStatus::Moved;
                }
            }
        }

        sleep(self.config.settle()).await;

        // A probe that cannot be re-armed is unrecoverable.
        if let Err(err) = self.probe.arm().await {
            error!(index, error = %err, "probe arm failed");
            return PointOutcome::Fatal;
        }
        match self.probe.fire_and_read_until(self.cancel.notified()).await {
            Ok(value) => PointOutcome::Probed(value),
            Err(err) => {
                warn!(index, error = %err, "probe failed, point marked failed");
                PointOutcome::Failed
            }
        }
    }
}
