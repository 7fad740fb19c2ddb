//! Gate actuation
//!
//! A gate is driven by two digital outputs on one IO module. Closing writes 0
//! to the close pin then 1 to the open pin; opening writes the inverse. The
//! actuator needs a short settle between the two writes and again before the
//! next command.

use crate::label::GateAddress;
use crate::profile::Timing;
use crate::topology::{Direction, PodIndex, Topology};
use crate::{validate, PodError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Open,
    Close,
}

impl GateAction {
    /// (close pin value, open pin value) written for this action
    fn pin_values(self) -> (i32, i32) {
        match self {
            GateAction::Close => (0, 1),
            GateAction::Open => (1, 0),
        }
    }
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateAction::Open => write!(f, "open"),
            GateAction::Close => write!(f, "close"),
        }
    }
}

impl FromStr for GateAction {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(GateAction::Open),
            "close" => Ok(GateAction::Close),
            _ => Err(PodError::UnknownAction(s.to_string())),
        }
    }
}

pub struct GateController {
    topology: Arc<Topology>,
    timing: Timing,
}

impl GateController {
    pub fn new(topology: Arc<Topology>, timing: Timing) -> Self {
        Self { topology, timing }
    }

    /// Drive one gate to `action`, including both settle delays
    pub async fn set_gate(&self, gate: &GateAddress, action: GateAction) -> Result<()> {
        validate::io_board(gate.device)?;
        validate::io_pin(gate.pin_close)?;
        validate::io_pin(gate.pin_open)?;
        let controller = self.topology.machine(gate.machine)?;

        debug!("Gate {} -> {}", gate.label, action);
        let (close_value, open_value) = action.pin_values();

        controller
            .digital_write(gate.device, gate.pin_close, close_value)
            .await
            .map_err(|e| PodError::controller(gate.machine, e))?;
        tokio::time::sleep(self.timing.gate_settle).await;
        controller
            .digital_write(gate.device, gate.pin_open, open_value)
            .await
            .map_err(|e| PodError::controller(gate.machine, e))?;

        tokio::time::sleep(self.timing.gate_trailing).await;
        Ok(())
    }

    /// Drive the gate serving `pod` in `direction`
    pub async fn set_gate_at(&self, pod: PodIndex, direction: Direction, action: GateAction) -> Result<()> {
        let gate = self.topology.gate(direction, pod)?;
        self.set_gate(gate, action).await
    }

    /// Drive every gate on the line, pod by pod, back before forward
    pub async fn move_all(&self, action: GateAction) -> Result<()> {
        info!("Moving all gates: {}", action);
        for pod in 1..=self.topology.n_pods() {
            for direction in [Direction::Back, Direction::Forward] {
                self.set_gate_at(pod, direction, action).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sample_line, ControllerCall};

    #[test]
    fn test_action_parsing() {
        assert_eq!("open".parse::<GateAction>().unwrap(), GateAction::Open);
        assert_eq!(" CLOSE ".parse::<GateAction>().unwrap(), GateAction::Close);
        assert!(matches!(
            "toggle".parse::<GateAction>(),
            Err(PodError::UnknownAction(action)) if action == "toggle"
        ));
    }

    #[tokio::test]
    async fn test_close_writes_close_pin_then_open_pin() {
        let (topology, sims) = sample_line();
        let gates = GateController::new(topology, Timing::immediate());

        gates.set_gate_at(2, Direction::Back, GateAction::Close).await.unwrap();

        // mm1_io2_pin23
        assert_eq!(
            sims[0].calls(),
            vec![
                ControllerCall::DigitalWrite { device: 2, pin: 2, value: 0 },
                ControllerCall::DigitalWrite { device: 2, pin: 3, value: 1 },
            ]
        );
        assert!(sims[1].calls().is_empty());
    }

    #[tokio::test]
    async fn test_last_action_wins() {
        let (topology, sims) = sample_line();
        let gates = GateController::new(topology, Timing::immediate());

        gates.set_gate_at(1, Direction::Forward, GateAction::Close).await.unwrap();
        gates.set_gate_at(1, Direction::Forward, GateAction::Open).await.unwrap();
        assert_eq!((sims[0].output(1, 0), sims[0].output(1, 1)), (Some(1), Some(0)));

        gates.set_gate_at(1, Direction::Forward, GateAction::Close).await.unwrap();
        assert_eq!((sims[0].output(1, 0), sims[0].output(1, 1)), (Some(0), Some(1)));
    }

    #[tokio::test]
    async fn test_invalid_pod_makes_no_calls() {
        let (topology, sims) = sample_line();
        let gates = GateController::new(topology, Timing::immediate());

        let err = gates.set_gate_at(4, Direction::Forward, GateAction::Open).await.unwrap_err();
        assert!(matches!(err, PodError::PodOutOfRange { pod: 4, .. }));
        assert!(sims.iter().all(|sim| sim.calls().is_empty()));
    }

    #[tokio::test]
    async fn test_move_all_covers_both_directions() {
        let (topology, sims) = sample_line();
        let gates = GateController::new(topology, Timing::immediate());

        gates.move_all(GateAction::Close).await.unwrap();
        assert_eq!(sims[0].calls().len(), 12);
        for device in 1..=3 {
            assert_eq!(sims[0].output(device, 0), Some(0));
            assert_eq!(sims[0].output(device, 1), Some(1));
            assert_eq!(sims[0].output(device, 2), Some(0));
            assert_eq!(sims[0].output(device, 3), Some(1));
        }
    }

    #[tokio::test]
    async fn test_controller_failure_propagates() {
        let (topology, sims) = sample_line();
        let gates = GateController::new(topology, Timing::immediate());
        sims[0].set_offline(true);

        let err = gates.set_gate_at(1, Direction::Forward, GateAction::Open).await.unwrap_err();
        assert!(matches!(err, PodError::Controller { machine: 0, .. }));
    }
}
