//! `scanctl`
//!
//! Motion and probe control core for a multi-axis 3D scanner.
//!
//! The crate translates high-level move/scan requests into axis commands,
//! maintains authoritative position state, enforces travel limits, and
//! sequences probe acquisition with motion. It is a library: the
//! presentation layer (GUI, CLI, remote API) talks to it exclusively
//! through the [`Scanner`] facade and never touches controller state
//! directly.
//!
//! ## Architecture
//!
//! - [`hal`]: capability traits implemented by device drivers
//!   ([`AxisDriver`], [`ProbeDriver`])
//! - [`drivers`]: simulated hardware for tests and development
//! - [`motion`]: [`MotionController`] for travel-limit enforcement, one
//!   outstanding multi-axis move at a time, consistent position snapshots
//! - [`probe`]: [`ProbeController`] with an Idle/Armed/Busy/Faulted state machine
//! - [`scan`]: [`ScanEngine`] running the move → settle → probe → record loop with
//!   pause/resume/abort
//! - [`scanner`]: [`Scanner`], the facade aggregating the above
//!
//! ## Example
//!
//! ```rust,no_run
//! use scanctl::{Position3D, Scanner, ScannerConfig};
//!
//! # async fn example() -> Result<(), scanctl::ScannerError> {
//! let scanner = Scanner::simulated(ScannerConfig::default())?;
//!
//! scanner.move_absolute(Position3D::new(10.0, 5.0, 0.0)).await?;
//! scanner.start_scan(scanctl::scan::plans::serpentine_grid(
//!     -20.0, 20.0, -20.0, 20.0, 10.0, 0.0,
//! )).await?;
//!
//! let status = scanner.status().await;
//! println!("at {:?}, scan {}", status.position, status.scan.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod motion;
pub mod probe;
pub mod scan;
pub mod scanner;

pub use config::{AxisConfig, ProbeConfig, ScanConfig, ScannerConfig};
pub use error::{AxisError, MotionError, ProbeError, ScanError, ScannerError};
pub use hal::{Axis, AxisDriver, LimitState, ProbeDriver};
pub use motion::{AxisState, MotionController, Position3D};
pub use probe::{ProbeController, ProbeStatus};
pub use scan::{PointStatus, ScanEngine, ScanJob, ScanPoint, ScanStatus};
pub use scanner::{Scanner, ScannerStatus};
