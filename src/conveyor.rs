//! Conveyor segment drive

use crate::label::ServoAddress;
use crate::profile::MotionProfile;
use crate::topology::{Direction, PodIndex, Topology};
use crate::{validate, PodError, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ConveyorDriver {
    topology: Arc<Topology>,
}

impl ConveyorDriver {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    /// Start continuous motion on a segment, signed by travel direction
    pub async fn start(&self, servo: &ServoAddress, direction: Direction, profile: MotionProfile) -> Result<()> {
        validate::axis(servo.axis)?;
        let controller = self.topology.machine(servo.machine)?;
        let speed = self.topology.sign(direction) * profile.speed;

        debug!("Conveyor {} {} at {} mm/s", servo.label, direction, speed);
        controller
            .start_continuous_move(servo.axis, speed, profile.acceleration)
            .await
            .map_err(|e| PodError::controller(servo.machine, e))
    }

    pub async fn stop(&self, servo: &ServoAddress, deceleration: f64) -> Result<()> {
        validate::axis(servo.axis)?;
        let controller = self.topology.machine(servo.machine)?;

        debug!("Conveyor {} stop", servo.label);
        controller
            .stop_continuous_move(servo.axis, deceleration)
            .await
            .map_err(|e| PodError::controller(servo.machine, e))
    }

    pub async fn start_at(&self, pod: PodIndex, direction: Direction, profile: MotionProfile) -> Result<()> {
        let servo = self.topology.servo(direction, pod)?;
        self.start(servo, direction, profile).await
    }

    pub async fn stop_at(&self, pod: PodIndex, direction: Direction, deceleration: f64) -> Result<()> {
        let servo = self.topology.servo(direction, pod)?;
        self.stop(servo, deceleration).await
    }

    /// Stop every segment of every pod in both directions.
    ///
    /// Keeps going past failures so one unreachable controller does not leave
    /// the others running; the first failure is returned afterwards.
    pub async fn stop_all(&self, deceleration: f64) -> Result<()> {
        info!("Stopping all conveyors");
        let mut first_error = None;

        for (direction, pod, servo) in self.topology.servos().iter() {
            if let Err(e) = self.stop(servo, deceleration).await {
                error!("Failed to stop conveyor at pod {} ({}): {}", pod, direction, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profiles;
    use crate::sim::{sample_line, ControllerCall};

    #[tokio::test]
    async fn test_back_inverts_velocity() {
        let (topology, sims) = sample_line();
        let conveyors = ConveyorDriver::new(topology);
        let cruise = Profiles::default().cruise;

        // pod 1: forward mm1_drive2, back mm1_drive1
        conveyors.start_at(1, Direction::Forward, cruise).await.unwrap();
        conveyors.start_at(1, Direction::Back, cruise).await.unwrap();

        assert_eq!(sims[0].axis_speed(2), 600.0);
        assert_eq!(sims[0].axis_speed(1), -600.0);
        assert_eq!(
            sims[0].calls()[0],
            ControllerCall::StartContinuousMove { axis: 2, speed: 600.0, acceleration: 10000.0 }
        );
    }

    #[tokio::test]
    async fn test_stop_routes_to_owning_machine() {
        let (topology, sims) = sample_line();
        let conveyors = ConveyorDriver::new(topology);

        conveyors.stop_at(3, Direction::Forward, 1000.0).await.unwrap();
        assert!(sims[0].calls().is_empty());
        assert_eq!(
            sims[1].calls(),
            vec![ControllerCall::StopContinuousMove { axis: 3, deceleration: 1000.0 }]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_pod_makes_no_calls() {
        let (topology, sims) = sample_line();
        let conveyors = ConveyorDriver::new(topology);
        let cruise = Profiles::default().cruise;

        for pod in [0, 4] {
            for direction in Direction::ALL {
                let err = conveyors.start_at(pod, direction, cruise).await.unwrap_err();
                assert!(matches!(err, PodError::PodOutOfRange { pod: p, n_pods: 3 } if p == pod));
                let err = conveyors.stop_at(pod, direction, 1000.0).await.unwrap_err();
                assert!(matches!(err, PodError::PodOutOfRange { pod: p, n_pods: 3 } if p == pod));
            }
        }
        assert!(sims.iter().all(|sim| sim.calls().is_empty()));
    }

    #[tokio::test]
    async fn test_stop_all_is_safe_when_idle() {
        let (topology, sims) = sample_line();
        let conveyors = ConveyorDriver::new(topology);

        conveyors.stop_all(1000.0).await.unwrap();
        conveyors.stop_all(1000.0).await.unwrap();

        let stops: usize = sims.iter().map(|sim| sim.calls().len()).sum();
        assert_eq!(stops, 12);
    }

    #[tokio::test]
    async fn test_stop_all_continues_past_offline_machine() {
        let (topology, sims) = sample_line();
        let conveyors = ConveyorDriver::new(topology);
        sims[0].set_offline(true);

        let err = conveyors.stop_all(1000.0).await.unwrap_err();
        assert!(matches!(err, PodError::Controller { machine: 0, .. }));
        // mm2 still received its three stops
        assert_eq!(sims[1].calls().len(), 3);
    }
}
