//! Pod Service - line startup and shutdown around the transport sequencer
//!
//! Brings every controller into a known state before the first transport:
//! axes configured, IO modules present, all conveyors stopped, software stop
//! released and controllers reset.

use crate::{
    config::ConveyorConfig,
    controller::{AxisSetup, MotionController},
    sequencer::TransportSequencer,
    sim::SimulatedController,
    telemetry::TelemetryPublisher,
    topology::Topology,
    PodError, Result,
};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::info;

/// Startup wrapper owning the topology and the sequencer
#[derive(Clone)]
pub struct PodService {
    topology: Arc<Topology>,
    sequencer: Arc<TransportSequencer>,
}

impl PodService {
    /// Load configuration from a file and start the line on the given controllers
    pub async fn new_with_config(
        config_path: &str,
        machines: Vec<Arc<dyn MotionController>>,
        telemetry: Arc<dyn TelemetryPublisher>,
    ) -> Result<Self> {
        let config = ConveyorConfig::load_from_path(config_path)?;
        Self::new(&config, machines, telemetry).await
    }

    /// Build the topology and run the startup sequence
    pub async fn new(
        config: &ConveyorConfig,
        machines: Vec<Arc<dyn MotionController>>,
        telemetry: Arc<dyn TelemetryPublisher>,
    ) -> Result<Self> {
        info!("Initializing pod transport service");

        let topology = Arc::new(Topology::new(config, machines)?);
        let sequencer = Arc::new(
            TransportSequencer::new(Arc::clone(&topology), config.profiles(), config.timing())
                .with_telemetry(telemetry),
        );
        let service = Self { topology, sequencer };

        service.configure_axes(config.axis_setup()).await?;
        service.verify_io_modules().await?;
        service.sequencer.stop_all_conveyors().await?;
        service.release_estop().await?;

        info!("Pod transport service initialized successfully");
        Ok(service)
    }

    /// Start the line on simulated controllers.
    ///
    /// Every sensor reports an obstacle for the configured number of reads
    /// before clearing, so a dry-run transport completes on its own.
    pub async fn simulated(
        config: &ConveyorConfig,
        telemetry: Arc<dyn TelemetryPublisher>,
    ) -> Result<(Self, Vec<Arc<SimulatedController>>)> {
        let simulation = config.simulation();
        let sims: Vec<Arc<SimulatedController>> = config
            .machines
            .iter()
            .map(|machine| Arc::new(SimulatedController::new(&machine.name, &simulation.io_devices())))
            .collect();
        let machines = sims
            .iter()
            .map(|sim| Arc::clone(sim) as Arc<dyn MotionController>)
            .collect();

        let service = Self::new(config, machines, telemetry).await?;

        let blocked_reads = simulation.reads_until_clear() as usize;
        for (_, _, sensor) in service.topology.sensors().iter() {
            sims[sensor.machine].script_input(sensor.device, sensor.pin, vec![1; blocked_reads]);
        }

        info!("Running against {} simulated controller(s)", sims.len());
        Ok((service, sims))
    }

    pub fn sequencer(&self) -> &Arc<TransportSequencer> {
        &self.sequencer
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Stop every conveyor on the line. Used on termination signals.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down pod transport service");
        self.sequencer.cancel_current();
        self.sequencer.stop_all_conveyors().await
    }

    /// Configure every axis on every machine, machines in parallel
    async fn configure_axes(&self, setup: AxisSetup) -> Result<()> {
        let axes = self.topology.axes_per_machine();
        let jobs = self.topology.machines().iter().enumerate().map(|(index, machine)| async move {
            for axis in 1..=axes {
                machine
                    .configure_axis(axis, setup.microsteps, setup.mech_gain)
                    .await
                    .map_err(|e| PodError::controller(index, e))?;
                info!("Axis {} of machine {} configured", axis, index + 1);
            }
            Ok::<(), PodError>(())
        });
        try_join_all(jobs).await?;
        Ok(())
    }

    /// Check that every IO module referenced by a gate or sensor is present
    async fn verify_io_modules(&self) -> Result<()> {
        for (index, devices) in self.topology.io_requirements() {
            let machine = self.topology.machine(index)?;
            let detected = machine
                .detect_io_modules()
                .await
                .map_err(|e| PodError::controller(index, e))?
                .filter(|modules| !modules.is_empty())
                .ok_or(PodError::NoIoModules { machine: index })?;

            for device in devices {
                if !detected.values().any(|id| *id == device) {
                    return Err(PodError::IoModuleMissing { machine: index, device });
                }
            }
            info!("Machine {}: {} IO module(s) detected", index + 1, detected.len());
        }
        Ok(())
    }

    /// Remove the software stop and reset every controller
    async fn release_estop(&self) -> Result<()> {
        for (index, machine) in self.topology.machines().iter().enumerate() {
            info!("Machine {}: removing software stop", index + 1);
            machine.release_estop().await.map_err(|e| PodError::controller(index, e))?;
            info!("Machine {}: resetting system", index + 1);
            machine.reset_system().await.map_err(|e| PodError::controller(index, e))?;
        }
        info!("Resetting completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SAMPLE_CONFIG;
    use crate::sequencer::TransportState;
    use crate::sim::ControllerCall;
    use crate::telemetry::NoOpTelemetry;

    fn sample_config() -> ConveyorConfig {
        let yaml = format!(
            "{}\ntiming:\n  gate_settle_ms: 0\n  gate_trailing_ms: 0\n  coast_ms: 0\n  poll_interval_ms: 1\nsimulation:\n  reads_until_clear: 2\n",
            SAMPLE_CONFIG
        );
        ConveyorConfig::load_from_str(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_startup_sequence() {
        let (_service, sims) = PodService::simulated(&sample_config(), Arc::new(NoOpTelemetry))
            .await
            .unwrap();

        let calls = sims[0].calls();
        assert_eq!(
            &calls[..3],
            &[1, 2, 3].map(|axis| ControllerCall::ConfigureAxis {
                axis,
                microsteps: 8,
                mech_gain: crate::controller::ROLLER_CONVEYOR_MM_TURN,
            })
        );
        assert_eq!(calls[3], ControllerCall::DetectIoModules);
        assert_eq!(&calls[calls.len() - 2..], &[ControllerCall::ReleaseEstop, ControllerCall::ResetSystem]);

        // mm2 carries no IO, so it is never probed
        assert!(!sims[1].calls().contains(&ControllerCall::DetectIoModules));
        let stops = sims[1]
            .calls()
            .iter()
            .filter(|call| matches!(call, ControllerCall::StopContinuousMove { .. }))
            .count();
        assert_eq!(stops, 3);
    }

    #[tokio::test]
    async fn test_simulated_transport_completes() {
        let (service, sims) = PodService::simulated(&sample_config(), Arc::new(NoOpTelemetry))
            .await
            .unwrap();

        service.sequencer().move_between_pods(1, 3).await.unwrap();
        assert_eq!(service.sequencer().state(), TransportState::Idle);

        let reads = sims[0]
            .calls()
            .iter()
            .filter(|call| matches!(call, ControllerCall::DigitalRead { .. }))
            .count();
        assert_eq!(reads, 3);
    }

    #[tokio::test]
    async fn test_missing_io_module_fails_startup() {
        let mut config = sample_config();
        config.simulation = Some(crate::config::SimulationConfig {
            io_devices: Some(vec![1, 2]),
            reads_until_clear: None,
        });

        let err = PodService::simulated(&config, Arc::new(NoOpTelemetry)).await.err().unwrap();
        assert!(matches!(err, PodError::IoModuleMissing { machine: 0, device: 3 }));
    }

    #[tokio::test]
    async fn test_no_io_modules_fails_startup() {
        let mut config = sample_config();
        config.simulation = Some(crate::config::SimulationConfig {
            io_devices: Some(vec![]),
            reads_until_clear: None,
        });

        let err = PodService::simulated(&config, Arc::new(NoOpTelemetry)).await.err().unwrap();
        assert!(matches!(err, PodError::NoIoModules { machine: 0 }));
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let (service, sims) = PodService::simulated(&sample_config(), Arc::new(NoOpTelemetry))
            .await
            .unwrap();
        for sim in &sims {
            sim.clear_calls();
        }

        service.shutdown().await.unwrap();
        let stops: usize = sims.iter().map(|sim| sim.calls().len()).sum();
        assert_eq!(stops, 6);
    }
}
