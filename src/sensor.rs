//! Presence sensor reads and the clear-wait poll

use crate::cancel::CancelHandle;
use crate::label::SensorAddress;
use crate::topology::{Direction, PodIndex, Topology};
use crate::{validate, PodError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub struct SensorReader {
    topology: Arc<Topology>,
}

impl SensorReader {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    /// Single digital read; `true` means an obstacle or part is present
    pub async fn read(&self, sensor: &SensorAddress) -> Result<bool> {
        validate::io_board(sensor.device)?;
        validate::io_pin(sensor.pin)?;
        let controller = self.topology.machine(sensor.machine)?;

        let value = controller
            .digital_read(sensor.device, sensor.pin)
            .await
            .map_err(|e| PodError::controller(sensor.machine, e))?;
        Ok(value != 0)
    }

    pub async fn read_at(&self, pod: PodIndex, direction: Direction) -> Result<bool> {
        let sensor = self.topology.sensor(direction, pod)?;
        self.read(sensor).await
    }

    /// Poll `sensor` every `interval` until it reads clear.
    ///
    /// Returns the number of reads taken. Fails with `ObstacleNotCleared` once
    /// `timeout` has elapsed, or `Cancelled` when `cancel` fires.
    pub async fn wait_until_clear(
        &self,
        sensor: &SensorAddress,
        interval: Duration,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<u32> {
        info!("Waiting for sensor {} to clear", sensor.label);
        let deadline = Instant::now() + timeout;
        let mut reads = 0;

        loop {
            cancel.check()?;
            reads += 1;
            if !self.read(sensor).await? {
                info!("Sensor {} clear after {} read(s)", sensor.label, reads);
                return Ok(reads);
            }

            if Instant::now() >= deadline {
                return Err(PodError::ObstacleNotCleared {
                    sensor: sensor.label.clone(),
                    timeout_ms: timeout.as_millis(),
                });
            }

            debug!("Sensor {} still blocked", sensor.label);
            cancel.sleep(interval).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sample_line, ControllerCall};

    #[tokio::test]
    async fn test_read_maps_nonzero_to_present() {
        let (topology, sims) = sample_line();
        let sensors = SensorReader::new(topology);

        // forward pod 2 is mm1_io2_pin0
        sims[0].script_input(2, 0, [1, 5, 0]);
        assert!(sensors.read_at(2, Direction::Forward).await.unwrap());
        assert!(sensors.read_at(2, Direction::Forward).await.unwrap());
        assert!(!sensors.read_at(2, Direction::Forward).await.unwrap());
        assert_eq!(sims[0].calls()[0], ControllerCall::DigitalRead { device: 2, pin: 0 });
    }

    #[tokio::test]
    async fn test_out_of_range_pod_makes_no_calls() {
        let (topology, sims) = sample_line();
        let sensors = SensorReader::new(topology);

        for pod in [0, 4] {
            for direction in Direction::ALL {
                let err = sensors.read_at(pod, direction).await.unwrap_err();
                assert!(matches!(err, PodError::PodOutOfRange { pod: p, n_pods: 3 } if p == pod));
            }
        }
        assert!(sims.iter().all(|sim| sim.calls().is_empty()));
    }

    #[tokio::test]
    async fn test_wait_until_clear_counts_reads() {
        let (topology, sims) = sample_line();
        let sensors = SensorReader::new(Arc::clone(&topology));
        sims[0].script_input(3, 1, [1, 1, 1]);

        let sensor = topology.sensor(Direction::Back, 3).unwrap();
        let reads = sensors
            .wait_until_clear(sensor, Duration::from_millis(1), Duration::from_secs(2), &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(reads, 4);
    }

    #[tokio::test]
    async fn test_wait_until_clear_times_out() {
        let (topology, sims) = sample_line();
        let sensors = SensorReader::new(Arc::clone(&topology));
        sims[0].set_input(1, 0, 1);

        let sensor = topology.sensor(Direction::Forward, 1).unwrap();
        let err = sensors
            .wait_until_clear(sensor, Duration::from_millis(2), Duration::from_millis(30), &CancelHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PodError::ObstacleNotCleared { ref sensor, timeout_ms: 30 } if sensor == "mm1_io1_pin0"
        ));
    }

    #[tokio::test]
    async fn test_wait_until_clear_cancelled() {
        let (topology, sims) = sample_line();
        let sensors = SensorReader::new(Arc::clone(&topology));
        sims[0].set_input(1, 0, 1);

        let cancel = CancelHandle::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });

        let sensor = topology.sensor(Direction::Forward, 1).unwrap();
        let err = sensors
            .wait_until_clear(sensor, Duration::from_millis(2), Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PodError::Cancelled));
    }
}
