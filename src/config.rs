//! Configuration management.
//!
//! Configuration is supplied at startup (TOML file or programmatic
//! construction), validated once, and treated as immutable for the
//! controller's lifetime.

use crate::error::ScannerError;
use crate::hal::Axis;
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Travel and speed limits for one axis, in machine units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub min_travel: f64,
    pub max_travel: f64,
    /// Machine units per second.
    pub max_speed: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            min_travel: -300.0,
            max_travel: 300.0,
            max_speed: 25.0,
        }
    }
}

/// Probe acquisition settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum time to wait for a reading after a trigger.
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_ms: 1_000 }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Scan-loop timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Dwell after motion stops before a probe reading is considered
    /// stable.
    pub settle_ms: u64,
    /// Maximum time to wait for a commanded move to complete.
    pub move_timeout_ms: u64,
    /// Polling period of the control loop.
    pub control_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            move_timeout_ms: 30_000,
            control_interval_ms: 10,
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    #[must_use]
    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }
}

/// Full scanner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub x: AxisConfig,
    pub y: AxisConfig,
    pub z: AxisConfig,
    pub probe: ProbeConfig,
    pub scan: ScanConfig,
}

impl ScannerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScannerError> {
        let cfg: Self = Config::builder()
            .add_source(config::File::from(path.as_ref().to_path_buf()))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Per-axis limits.
    #[must_use]
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Semantic validation: each axis range must be non-inverted with a
    /// positive speed, and all timings positive.
    pub fn validate(&self) -> Result<(), ScannerError> {
        for axis in Axis::ALL {
            let cfg = self.axis(axis);
            if cfg.min_travel >= cfg.max_travel {
                return Err(ScannerError::Configuration(format!(
                    "axis {axis}: min_travel {} must be below max_travel {}",
                    cfg.min_travel, cfg.max_travel
                )));
            }
            if cfg.max_speed <= 0.0 {
                return Err(ScannerError::Configuration(format!(
                    "axis {axis}: max_speed must be positive, got {}",
                    cfg.max_speed
                )));
            }
        }
        if self.probe.timeout_ms == 0 {
            return Err(ScannerError::Configuration(
                "probe timeout_ms must be positive".into(),
            ));
        }
        if self.scan.move_timeout_ms == 0 || self.scan.control_interval_ms == 0 {
            return Err(ScannerError::Configuration(
                "scan move_timeout_ms and control_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        assert!(ScannerConfig::default().validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[x]
min_travel = -150.0
max_travel = 150.0
max_speed = 50.0

[probe]
timeout_ms = 250

[scan]
settle_ms = 20
"#
        )
        .unwrap();

        let cfg = ScannerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.x.max_travel, 150.0);
        assert_eq!(cfg.x.max_speed, 50.0);
        // Unspecified sections fall back to defaults.
        assert_eq!(cfg.y.max_travel, 300.0);
        assert_eq!(cfg.probe.timeout_ms, 250);
        assert_eq!(cfg.scan.settle_ms, 20);
        assert_eq!(cfg.scan.move_timeout_ms, 30_000);
    }

    #[test]
    fn inverted_travel_range_rejected() {
        let cfg = ScannerConfig {
            y: AxisConfig {
                min_travel: 100.0,
                max_travel: -100.0,
                max_speed: 25.0,
            },
            ..ScannerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ScannerError::Configuration(_)));
        assert!(err.to_string().contains("axis Y"));
    }

    #[test]
    fn zero_speed_rejected() {
        let cfg = ScannerConfig {
            z: AxisConfig {
                max_speed: 0.0,
                ..AxisConfig::default()
            },
            ..ScannerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
