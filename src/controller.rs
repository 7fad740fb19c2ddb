//! Motion controller capability contract
//!
//! The coordinator never talks to hardware directly. Each physical controller
//! on the line is reached through a [`MotionController`] implementation that
//! wraps the vendor driver and its network transport.

use async_trait::async_trait;
use std::collections::HashMap;

/// Microstep setting applied to every conveyor axis
pub const DEFAULT_MICROSTEPS: u16 = 8;

/// Travel per motor turn of a roller conveyor, in mm
pub const ROLLER_CONVEYOR_MM_TURN: f64 = std::f64::consts::PI * 0.8 * 25.4;

/// Detected digital IO modules, keyed by module name
pub type IoModules = HashMap<String, u32>;

/// Operations the coordinator needs from one motion controller.
///
/// Implementations report transport or hardware failures as errors; the
/// coordinator never retries them.
#[async_trait]
pub trait MotionController: Send + Sync {
    /// Host or identifier used in log messages
    fn name(&self) -> &str;

    /// Configure a drive axis for continuous conveyor motion
    async fn configure_axis(&self, axis: u32, microsteps: u16, mech_gain: f64) -> anyhow::Result<()>;

    /// Remove the software stop so motion commands are accepted
    async fn release_estop(&self) -> anyhow::Result<()>;

    /// Reset the controller after releasing the software stop
    async fn reset_system(&self) -> anyhow::Result<()>;

    /// Read one digital input, non-zero means the input is active
    async fn digital_read(&self, device: u32, pin: u32) -> anyhow::Result<i32>;

    async fn digital_write(&self, device: u32, pin: u32, value: i32) -> anyhow::Result<()>;

    /// Start continuous motion at a signed speed (mm/s) and acceleration (mm/s^2)
    async fn start_continuous_move(&self, axis: u32, speed: f64, acceleration: f64) -> anyhow::Result<()>;

    /// Stop continuous motion. Must succeed when the axis is already idle.
    async fn stop_continuous_move(&self, axis: u32, deceleration: f64) -> anyhow::Result<()>;

    /// Discover connected digital IO modules, `None` when none respond
    async fn detect_io_modules(&self) -> anyhow::Result<Option<IoModules>>;
}

/// Axis setup applied to every drive during startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSetup {
    pub microsteps: u16,
    pub mech_gain: f64,
}

impl Default for AxisSetup {
    fn default() -> Self {
        Self {
            microsteps: DEFAULT_MICROSTEPS,
            mech_gain: ROLLER_CONVEYOR_MM_TURN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roller_conveyor_gain() {
        assert!((ROLLER_CONVEYOR_MM_TURN - 63.8372).abs() < 1e-3);
        assert_eq!(AxisSetup::default().microsteps, 8);
    }
}
