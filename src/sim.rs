//! Simulated motion controller
//!
//! In-memory stand-in for a line controller. Every call is recorded so a
//! caller can assert on the exact command sequence, digital outputs and axis
//! speeds are tracked, and digital inputs can be scripted reading by reading.

use crate::controller::{IoModules, MotionController};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
#[cfg(test)]
use std::sync::Arc;
use tracing::debug;

/// One call received by a [`SimulatedController`]
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCall {
    ConfigureAxis { axis: u32, microsteps: u16, mech_gain: f64 },
    ReleaseEstop,
    ResetSystem,
    DigitalRead { device: u32, pin: u32 },
    DigitalWrite { device: u32, pin: u32, value: i32 },
    StartContinuousMove { axis: u32, speed: f64, acceleration: f64 },
    StopContinuousMove { axis: u32, deceleration: f64 },
    DetectIoModules,
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<ControllerCall>,
    outputs: HashMap<(u32, u32), i32>,
    scripted_inputs: HashMap<(u32, u32), VecDeque<i32>>,
    idle_inputs: HashMap<(u32, u32), i32>,
    axis_speeds: HashMap<u32, f64>,
    offline: bool,
}

pub struct SimulatedController {
    name: String,
    io_modules: Option<IoModules>,
    state: Mutex<SimState>,
}

impl SimulatedController {
    /// Create a controller exposing digital IO modules with the given network ids
    pub fn new(name: &str, io_devices: &[u32]) -> Self {
        let io_modules = if io_devices.is_empty() {
            None
        } else {
            Some(
                io_devices
                    .iter()
                    .map(|id| (format!("Digital IO Network Id {}", id), *id))
                    .collect(),
            )
        };

        Self {
            name: name.to_string(),
            io_modules,
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call that has no effect on the simulated state
    fn log(&self, call: ControllerCall) -> anyhow::Result<()> {
        self.record(call).map(drop)
    }

    fn record(&self, call: ControllerCall) -> anyhow::Result<MutexGuard<'_, SimState>> {
        let mut state = self.state();
        if state.offline {
            return Err(anyhow!("{} is not responding", self.name));
        }
        debug!("[{}] {:?}", self.name, call);
        state.calls.push(call);
        Ok(state)
    }

    /// Queue readings for an input; each read consumes one value
    pub fn script_input(&self, device: u32, pin: u32, readings: impl IntoIterator<Item = i32>) {
        self.state()
            .scripted_inputs
            .entry((device, pin))
            .or_default()
            .extend(readings);
    }

    /// Value an input reports once its scripted readings are exhausted
    pub fn set_input(&self, device: u32, pin: u32, value: i32) {
        self.state().idle_inputs.insert((device, pin), value);
    }

    /// Make every subsequent call fail as if the network link dropped
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Last value written to an output, `None` if never written
    pub fn output(&self, device: u32, pin: u32) -> Option<i32> {
        self.state().outputs.get(&(device, pin)).copied()
    }

    /// Commanded speed of an axis, zero when stopped
    pub fn axis_speed(&self, axis: u32) -> f64 {
        self.state().axis_speeds.get(&axis).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl MotionController for SimulatedController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure_axis(&self, axis: u32, microsteps: u16, mech_gain: f64) -> anyhow::Result<()> {
        self.log(ControllerCall::ConfigureAxis { axis, microsteps, mech_gain })
    }

    async fn release_estop(&self) -> anyhow::Result<()> {
        self.log(ControllerCall::ReleaseEstop)
    }

    async fn reset_system(&self) -> anyhow::Result<()> {
        self.log(ControllerCall::ResetSystem)
    }

    async fn digital_read(&self, device: u32, pin: u32) -> anyhow::Result<i32> {
        let mut state = self.record(ControllerCall::DigitalRead { device, pin })?;
        let scripted = state
            .scripted_inputs
            .get_mut(&(device, pin))
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| state.idle_inputs.get(&(device, pin)).copied().unwrap_or(0)))
    }

    async fn digital_write(&self, device: u32, pin: u32, value: i32) -> anyhow::Result<()> {
        let mut state = self.record(ControllerCall::DigitalWrite { device, pin, value })?;
        state.outputs.insert((device, pin), value);
        Ok(())
    }

    async fn start_continuous_move(&self, axis: u32, speed: f64, acceleration: f64) -> anyhow::Result<()> {
        let mut state = self.record(ControllerCall::StartContinuousMove { axis, speed, acceleration })?;
        state.axis_speeds.insert(axis, speed);
        Ok(())
    }

    async fn stop_continuous_move(&self, axis: u32, deceleration: f64) -> anyhow::Result<()> {
        let mut state = self.record(ControllerCall::StopContinuousMove { axis, deceleration })?;
        state.axis_speeds.insert(axis, 0.0);
        Ok(())
    }

    async fn detect_io_modules(&self) -> anyhow::Result<Option<IoModules>> {
        self.log(ControllerCall::DetectIoModules)?;
        Ok(self.io_modules.clone())
    }
}

/// Sample two-machine, three-pod line backed by simulated controllers
#[cfg(test)]
pub(crate) fn sample_line() -> (Arc<crate::topology::Topology>, Vec<Arc<SimulatedController>>) {
    use crate::config::{ConveyorConfig, SAMPLE_CONFIG};
    use crate::topology::Topology;

    let config = ConveyorConfig::load_from_str(SAMPLE_CONFIG).expect("sample config");
    let sims: Vec<Arc<SimulatedController>> = config
        .machines
        .iter()
        .map(|m| Arc::new(SimulatedController::new(&m.name, &[1, 2, 3])))
        .collect();
    let machines = sims
        .iter()
        .map(|sim| Arc::clone(sim) as Arc<dyn MotionController>)
        .collect();
    let topology = Topology::new(&config, machines).expect("sample topology");
    (Arc::new(topology), sims)
}
