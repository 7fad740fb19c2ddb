//! Motion profiles and actuator timing

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CRUISE_SPEED: f64 = 600.0;
pub const CRUISE_ACCELERATION: f64 = 10000.0;
pub const FINE_SPEED: f64 = 200.0;
pub const FINE_ACCELERATION: f64 = 10000.0;
pub const STOP_DECELERATION: f64 = 1000.0;

/// Pause between the two pin writes of a gate actuation
pub const GATE_SETTLE: Duration = Duration::from_millis(100);
/// Pause after every gate actuation before the next command
pub const GATE_TRAILING: Duration = Duration::from_millis(100);
/// Hold time of the destination segment at fine speed before the others join
pub const APPROACH_WINDOW: Duration = Duration::ZERO;
/// Time the load is given to coast to rest before the final stop
pub const COAST: Duration = Duration::from_secs(3);
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a timed-out transport may take to unwind before it is abandoned
pub const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Speed (mm/s) and acceleration (mm/s^2) of a conveyor move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    pub speed: f64,
    pub acceleration: f64,
}

impl MotionProfile {
    pub fn new(speed: f64, acceleration: f64) -> Self {
        Self { speed, acceleration }
    }
}

/// Named profiles used by a transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profiles {
    pub cruise: MotionProfile,
    pub fine: MotionProfile,
    pub stop_deceleration: f64,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            cruise: MotionProfile::new(CRUISE_SPEED, CRUISE_ACCELERATION),
            fine: MotionProfile::new(FINE_SPEED, FINE_ACCELERATION),
            stop_deceleration: STOP_DECELERATION,
        }
    }
}

/// Settle and polling intervals of the transport sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub gate_settle: Duration,
    pub gate_trailing: Duration,
    pub approach_window: Duration,
    pub coast: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub cancel_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            gate_settle: GATE_SETTLE,
            gate_trailing: GATE_TRAILING,
            approach_window: APPROACH_WINDOW,
            coast: COAST,
            poll_interval: POLL_INTERVAL,
            poll_timeout: POLL_TIMEOUT,
            cancel_grace: CANCEL_GRACE,
        }
    }
}

impl Timing {
    /// No settle delays, for dry runs and tests. The poll timeout stays bounded.
    pub fn immediate() -> Self {
        Self {
            gate_settle: Duration::ZERO,
            gate_trailing: Duration::ZERO,
            approach_window: Duration::ZERO,
            coast: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            poll_timeout: Duration::from_secs(2),
            cancel_grace: Duration::from_millis(50),
        }
    }
}
