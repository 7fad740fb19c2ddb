//! Configuration loading for the conveyor line

use crate::controller::AxisSetup;
use crate::profile::{self, MotionProfile, Profiles, Timing};
use crate::topology::Direction;
use crate::{PodError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConveyorConfig {
    pub line: LineConfig,
    pub machines: Vec<MachineConfig>,
    pub mapping: MappingConfig,
    pub direction_sign: Option<DirectionSign>,
    pub kinematics: Option<KinematicsConfig>,
    pub axis: Option<AxisConfig>,
    pub timing: Option<TimingConfig>,
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineConfig {
    pub n_pods: usize,
    pub axes_per_machine: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineConfig {
    pub name: String,
    pub host: String,
}

/// Symbolic labels per role, indexed by pod
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    pub sensor: DirectionLabels,
    pub gate: DirectionLabels,
    pub servo: DirectionLabels,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectionLabels {
    pub forward: Vec<String>,
    pub back: Vec<String>,
}

impl DirectionLabels {
    pub fn for_direction(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Back => &self.back,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DirectionSign {
    pub forward: i8,
    pub back: i8,
}

impl Default for DirectionSign {
    fn default() -> Self {
        Self { forward: 1, back: -1 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KinematicsConfig {
    pub cruise: Option<MotionProfile>,
    pub fine: Option<MotionProfile>,
    pub stop_deceleration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisConfig {
    pub microsteps: Option<u16>,
    pub mech_gain: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    pub gate_settle_ms: Option<u64>,
    pub gate_trailing_ms: Option<u64>,
    pub approach_window_ms: Option<u64>,
    pub coast_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
}

/// Behaviour of the simulated controllers used for dry runs
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub io_devices: Option<Vec<u32>>,
    pub reads_until_clear: Option<u32>,
}

impl SimulationConfig {
    pub fn io_devices(&self) -> Vec<u32> {
        self.io_devices.clone().unwrap_or_else(|| vec![1, 2, 3])
    }

    /// Sensor reads reporting an obstacle before the simulated load clears
    pub fn reads_until_clear(&self) -> u32 {
        self.reads_until_clear.unwrap_or(5)
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl ConveyorConfig {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let contents = fs::read_to_string(config_path).map_err(|e| {
            PodError::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: ConveyorConfig = serde_yaml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    /// Structural checks that do not depend on label contents
    pub fn check(&self) -> Result<()> {
        if self.line.n_pods == 0 {
            return Err(PodError::Config("line.n_pods must be at least 1".to_string()));
        }
        if self.machines.is_empty() {
            return Err(PodError::Config("at least one machine must be configured".to_string()));
        }
        if !(1..=3).contains(&self.line.axes_per_machine) {
            return Err(PodError::Config(format!(
                "line.axes_per_machine must be in [1, 3], got {}",
                self.line.axes_per_machine
            )));
        }

        let tables = [
            ("sensor", &self.mapping.sensor),
            ("gate", &self.mapping.gate),
            ("servo", &self.mapping.servo),
        ];
        for (role, labels) in tables {
            for direction in Direction::ALL {
                let count = labels.for_direction(direction).len();
                if count != self.line.n_pods {
                    return Err(PodError::Config(format!(
                        "mapping.{}.{} has {} labels, expected {}",
                        role, direction, count, self.line.n_pods
                    )));
                }
            }
        }

        let sign = self.direction_sign();
        if !matches!(sign.forward, 1 | -1) || sign.back != -sign.forward {
            return Err(PodError::Config(format!(
                "direction_sign must be +1/-1 and opposite, got forward={} back={}",
                sign.forward, sign.back
            )));
        }

        let profiles = self.profiles();
        let speeds = [profiles.cruise, profiles.fine];
        if speeds.iter().any(|p| p.speed <= 0.0 || p.acceleration <= 0.0)
            || profiles.stop_deceleration <= 0.0
        {
            return Err(PodError::Config(
                "kinematics speeds and accelerations must be positive".to_string(),
            ));
        }

        if self.timing().poll_interval.is_zero() {
            return Err(PodError::Config(
                "timing.poll_interval_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn direction_sign(&self) -> DirectionSign {
        self.direction_sign.unwrap_or_default()
    }

    /// Motion profiles with defaults for anything not configured
    pub fn profiles(&self) -> Profiles {
        let defaults = Profiles::default();
        match &self.kinematics {
            Some(k) => Profiles {
                cruise: k.cruise.unwrap_or(defaults.cruise),
                fine: k.fine.unwrap_or(defaults.fine),
                stop_deceleration: k.stop_deceleration.unwrap_or(defaults.stop_deceleration),
            },
            None => defaults,
        }
    }

    pub fn axis_setup(&self) -> AxisSetup {
        let defaults = AxisSetup::default();
        match &self.axis {
            Some(a) => AxisSetup {
                microsteps: a.microsteps.unwrap_or(defaults.microsteps),
                mech_gain: a.mech_gain.unwrap_or(defaults.mech_gain),
            },
            None => defaults,
        }
    }

    /// Timing with defaults for anything not configured
    pub fn timing(&self) -> Timing {
        match &self.timing {
            Some(t) => Timing {
                gate_settle: millis_or(t.gate_settle_ms, profile::GATE_SETTLE),
                gate_trailing: millis_or(t.gate_trailing_ms, profile::GATE_TRAILING),
                approach_window: millis_or(t.approach_window_ms, profile::APPROACH_WINDOW),
                coast: millis_or(t.coast_ms, profile::COAST),
                poll_interval: millis_or(t.poll_interval_ms, profile::POLL_INTERVAL),
                poll_timeout: millis_or(t.poll_timeout_ms, profile::POLL_TIMEOUT),
                cancel_grace: millis_or(t.cancel_grace_ms, profile::CANCEL_GRACE),
            },
            None => Timing::default(),
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        self.simulation.clone().unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
line:
  n_pods: 3
  axes_per_machine: 3
machines:
  - name: mm1
    host: 192.168.7.5
  - name: mm2
    host: 192.168.7.4
mapping:
  sensor:
    forward: [mm1_io1_pin0, mm1_io2_pin0, mm1_io3_pin0]
    back: [mm1_io1_pin1, mm1_io2_pin1, mm1_io3_pin1]
  gate:
    forward: [mm1_io1_pin01, mm1_io2_pin01, mm1_io3_pin01]
    back: [mm1_io1_pin23, mm1_io2_pin23, mm1_io3_pin23]
  servo:
    forward: [mm1_drive2, mm2_drive1, mm2_drive3]
    back: [mm1_drive1, mm1_drive3, mm2_drive2]
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sample_config_defaults() {
        let config = ConveyorConfig::load_from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.line.n_pods, 3);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.profiles(), Profiles::default());
        assert_eq!(config.timing(), Timing::default());
        assert_eq!(config.direction_sign().forward, 1);
        assert_eq!(config.direction_sign().back, -1);
        assert_eq!(config.simulation().reads_until_clear(), 5);
    }

    #[test]
    fn test_partial_overrides_keep_defaults() {
        let yaml = format!(
            "{}\nkinematics:\n  fine:\n    speed: 150\n    acceleration: 5000\ntiming:\n  coast_ms: 1500\n",
            SAMPLE_CONFIG
        );
        let config = ConveyorConfig::load_from_str(&yaml).unwrap();
        let profiles = config.profiles();
        assert_eq!(profiles.fine, MotionProfile::new(150.0, 5000.0));
        assert_eq!(profiles.cruise.speed, profile::CRUISE_SPEED);

        let timing = config.timing();
        assert_eq!(timing.coast, Duration::from_millis(1500));
        assert_eq!(timing.gate_settle, profile::GATE_SETTLE);
    }

    #[test]
    fn test_rejects_same_direction_signs() {
        let yaml = format!("{}\ndirection_sign:\n  forward: -1\n  back: -1\n", SAMPLE_CONFIG);
        let err = ConveyorConfig::load_from_str(&yaml).unwrap_err();
        assert!(matches!(err, PodError::Config(msg) if msg.contains("direction_sign")));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let yaml = format!("{}\ntiming:\n  poll_interval_ms: 0\n", SAMPLE_CONFIG);
        let err = ConveyorConfig::load_from_str(&yaml).unwrap_err();
        assert!(matches!(err, PodError::Config(msg) if msg.contains("poll_interval_ms")));

        let yaml = format!("{}\ntiming:\n  poll_interval_ms: 1\n", SAMPLE_CONFIG);
        let config = ConveyorConfig::load_from_str(&yaml).unwrap();
        assert_eq!(config.timing().poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_rejects_short_mapping_table() {
        let yaml = SAMPLE_CONFIG.replace(
            "back: [mm1_drive1, mm1_drive3, mm2_drive2]",
            "back: [mm1_drive1, mm1_drive3]",
        );
        let err = ConveyorConfig::load_from_str(&yaml).unwrap_err();
        assert!(matches!(err, PodError::Config(msg) if msg.contains("mapping.servo.back")));
    }

    #[test]
    fn test_shipped_default_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default_config.yaml");
        let config = ConveyorConfig::load_from_path(path).unwrap();
        assert_eq!(config.profiles(), Profiles::default());
        assert_eq!(config.timing(), Timing::default());
        assert_eq!(config.axis_setup().microsteps, 8);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = ConveyorConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.mapping.gate.back[2], "mm1_io3_pin23");

        let missing = ConveyorConfig::load_from_path("does/not/exist.yaml").unwrap_err();
        assert!(matches!(missing, PodError::Config(_)));
    }
}
