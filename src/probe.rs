//! Probe sequencing.
//!
//! [`ProbeController`] owns the probe device and drives its state machine:
//!
//! ```text
//! Idle ──arm()──▶ Arming ──ok──▶ Armed ──fire_and_read()──▶ Busy ──reading──▶ Idle
//!                   ▲                                         │
//!                   └──────────────arm()──────────────────────┴─timeout/fault──▶ Faulted
//! ```
//!
//! `fire_and_read` suspends until the hardware reports a reading or the
//! configured timeout elapses. A timeout or device error leaves the probe
//! Faulted; an explicit re-arm clears the fault. Every transition is
//! claimed under the state lock before the hardware is awaited, so
//! concurrent callers observe Arming/Busy and are rejected instead of
//! interleaving with the in-flight operation.

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::hal::ProbeDriver;
use serde::{Deserialize, Serialize};
use std::future::{pending, Future};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbePhase {
    Idle,
    Arming,
    Armed,
    Busy,
    Faulted,
}

/// Published snapshot of the probe state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub armed: bool,
    /// True while an arm or fire/read cycle is in progress.
    pub busy: bool,
    pub faulted: bool,
    pub last_reading: Option<f64>,
}

struct ProbeInner {
    phase: ProbePhase,
    last_reading: Option<f64>,
}

/// Owns the probe device; exposes arm/fire/read and a busy/idle state.
pub struct ProbeController {
    driver: Arc<dyn ProbeDriver>,
    config: ProbeConfig,
    inner: RwLock<ProbeInner>,
}

impl ProbeController {
    #[must_use]
    pub fn new(driver: Arc<dyn ProbeDriver>, config: ProbeConfig) -> Self {
        Self {
            driver,
            config,
            inner: RwLock::new(ProbeInner {
                phase: ProbePhase::Idle,
                last_reading: None,
            }),
        }
    }

    /// Arm the probe for one trigger. Re-arming from Faulted clears the
    /// fault; arming while an arm or fire/read cycle is in progress is
    /// rejected.
    pub async fn arm(&self) -> Result<(), ProbeError> {
        {
            // Claim the transition before awaiting the hardware so a
            // concurrent fire cannot interleave with the arm.
            let mut inner = self.inner.write().await;
            match inner.phase {
                ProbePhase::Busy | ProbePhase::Arming => return Err(ProbeError::AlreadyBusy),
                ProbePhase::Idle | ProbePhase::Armed | ProbePhase::Faulted => {
                    inner.phase = ProbePhase::Arming;
                }
            }
        }
        match self.driver.arm().await {
            Ok(()) => {
                self.inner.write().await.phase = ProbePhase::Armed;
                debug!("probe armed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "probe arm failed");
                self.inner.write().await.phase = ProbePhase::Faulted;
                Err(err)
            }
        }
    }

    /// Trigger the probe and wait for its reading.
    ///
    /// Fails immediately with [`ProbeError::AlreadyBusy`] while a cycle is
    /// in progress (the request is not queued and `last_reading` is left
    /// untouched) and with [`ProbeError::NotArmed`] when called without
    /// arming. On timeout or device fault the probe enters Faulted and
    /// must be re-armed. Each successful read disarms: one reading per arm.
    pub async fn fire_and_read(&self) -> Result<f64, ProbeError> {
        self.fire_inner(pending()).await
    }

    /// Like [`Self::fire_and_read`], but also resolves when `cancel`
    /// completes: the acquisition fails with [`ProbeError::Interrupted`]
    /// and the probe returns to Idle, immediately re-armable.
    pub async fn fire_and_read_until(
        &self,
        cancel: impl Future<Output = ()>,
    ) -> Result<f64, ProbeError> {
        self.fire_inner(cancel).await
    }

    async fn fire_inner(&self, cancel: impl Future<Output = ()>) -> Result<f64, ProbeError> {
        {
            let mut inner = self.inner.write().await;
            match inner.phase {
                ProbePhase::Busy => return Err(ProbeError::AlreadyBusy),
                ProbePhase::Idle | ProbePhase::Arming | ProbePhase::Faulted => {
                    return Err(ProbeError::NotArmed)
                }
                ProbePhase::Armed => inner.phase = ProbePhase::Busy,
            }
        }

        // State lock is released across the hardware wait so the busy state
        // stays observable and concurrent callers are rejected promptly.
        let result = tokio::select! {
            outcome = timeout(self.config.timeout(), self.driver.fire()) => match outcome {
                Ok(Ok(reading)) => Ok(reading),
                Ok(Err(err)) => Err(err),
                Err(_elapsed) => Err(ProbeError::Timeout),
            },
            () = cancel => Err(ProbeError::Interrupted),
        };

        let mut inner = self.inner.write().await;
        match &result {
            Ok(reading) => {
                debug!(reading = *reading, "probe reading delivered");
                inner.phase = ProbePhase::Idle;
                inner.last_reading = Some(*reading);
            }
            Err(ProbeError::Interrupted) => {
                debug!("probe acquisition interrupted");
                inner.phase = ProbePhase::Idle;
            }
            Err(err) => {
                warn!(error = %err, "probe fire failed");
                inner.phase = ProbePhase::Faulted;
            }
        }
        result
    }

    /// True while an arm or fire/read cycle is in progress.
    pub async fn is_busy(&self) -> bool {
        matches!(
            self.inner.read().await.phase,
            ProbePhase::Busy | ProbePhase::Arming
        )
    }

    /// Published snapshot.
    pub async fn status(&self) -> ProbeStatus {
        let inner = self.inner.read().await;
        ProbeStatus {
            armed: inner.phase == ProbePhase::Armed,
            busy: matches!(inner.phase, ProbePhase::Busy | ProbePhase::Arming),
            faulted: inner.phase == ProbePhase::Faulted,
            last_reading: inner.last_reading,
        }
    }
}
