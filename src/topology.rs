//! Topology registry
//!
//! Binds every (direction, pod) pair to the physical sensor, gate and servo
//! that serve it, and holds the controller handle for every machine on the
//! line. Labels are resolved and validated once, when the topology is built;
//! the result is immutable and shared behind an `Arc`.

use crate::config::{ConveyorConfig, DirectionLabels, DirectionSign};
use crate::controller::MotionController;
use crate::label::{GateAddress, SensorAddress, ServoAddress};
use crate::{validate, PodError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// 1-indexed position of a dock along the line
pub type PodIndex = usize;

/// Travel direction along the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Back,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Back];

    /// Direction of travel from one pod to another, `None` for the same pod
    pub fn between(from: PodIndex, to: PodIndex) -> Option<Self> {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some(Direction::Forward),
            std::cmp::Ordering::Less => Some(Direction::Back),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Back => write!(f, "back"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "back" => Ok(Direction::Back),
            other => Err(format!("unknown direction '{}', expected 'forward' or 'back'", other)),
        }
    }
}

/// Per-direction lists of addresses, indexed by pod
#[derive(Debug, Clone)]
pub struct DirectionTable<T> {
    forward: Vec<T>,
    back: Vec<T>,
}

impl<T> DirectionTable<T> {
    fn parse<F>(labels: &DirectionLabels, parse: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<T>,
    {
        let parse_all = |labels: &[String]| -> Result<Vec<T>> {
            labels.iter().map(|label| parse(label.as_str())).collect()
        };
        Ok(Self {
            forward: parse_all(&labels.forward)?,
            back: parse_all(&labels.back)?,
        })
    }

    fn list(&self, direction: Direction) -> &[T] {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Back => &self.back,
        }
    }

    /// Address serving `pod` in `direction`, after validating the pod number
    pub fn get(&self, direction: Direction, pod: PodIndex) -> Result<&T> {
        let list = self.list(direction);
        validate::pod(pod, list.len())?;
        Ok(&list[pod - 1])
    }

    /// Every entry with its direction and pod number
    pub fn iter(&self) -> impl Iterator<Item = (Direction, PodIndex, &T)> {
        Direction::ALL.into_iter().flat_map(move |direction| {
            self.list(direction)
                .iter()
                .enumerate()
                .map(move |(i, entry)| (direction, i + 1, entry))
        })
    }
}

pub struct Topology {
    machines: Vec<Arc<dyn MotionController>>,
    n_pods: usize,
    axes_per_machine: u32,
    sign: DirectionSign,
    sensors: DirectionTable<SensorAddress>,
    gates: DirectionTable<GateAddress>,
    servos: DirectionTable<ServoAddress>,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("machines", &self.machines.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("n_pods", &self.n_pods)
            .field("sensors", &self.sensors)
            .field("gates", &self.gates)
            .field("servos", &self.servos)
            .finish()
    }
}

impl Topology {
    /// Build the registry from configuration and one controller per configured machine.
    ///
    /// Fails on the first label that is malformed or out of range.
    pub fn new(config: &ConveyorConfig, machines: Vec<Arc<dyn MotionController>>) -> Result<Self> {
        config.check()?;
        if machines.len() != config.machines.len() {
            return Err(PodError::Config(format!(
                "{} machine(s) configured but {} controller(s) supplied",
                config.machines.len(),
                machines.len()
            )));
        }

        let count = machines.len();
        let sensors = DirectionTable::parse(&config.mapping.sensor, |l| SensorAddress::parse(l, count))?;
        let gates = DirectionTable::parse(&config.mapping.gate, |l| GateAddress::parse(l, count))?;
        let servos = DirectionTable::parse(&config.mapping.servo, |l| ServoAddress::parse(l, count))?;

        for (direction, pod, servo) in servos.iter() {
            if servo.axis > config.line.axes_per_machine {
                return Err(PodError::Config(format!(
                    "servo {} ({} pod {}) uses axis {} but machines have {} axes",
                    servo.label, direction, pod, servo.axis, config.line.axes_per_machine
                )));
            }
        }

        info!(
            "Topology loaded: {} pod(s), {} machine(s)",
            config.line.n_pods, count
        );

        Ok(Self {
            machines,
            n_pods: config.line.n_pods,
            axes_per_machine: config.line.axes_per_machine,
            sign: config.direction_sign(),
            sensors,
            gates,
            servos,
        })
    }

    pub fn n_pods(&self) -> usize {
        self.n_pods
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn axes_per_machine(&self) -> u32 {
        self.axes_per_machine
    }

    /// Controller handle for a 0-indexed machine position
    pub fn machine(&self, index: usize) -> Result<&Arc<dyn MotionController>> {
        self.machines.get(index).ok_or(PodError::MachineOutOfRange {
            machine: index as u32 + 1,
            connected: self.machines.len(),
        })
    }

    pub fn machines(&self) -> &[Arc<dyn MotionController>] {
        &self.machines
    }

    /// Velocity multiplier for a travel direction
    pub fn sign(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Forward => f64::from(self.sign.forward),
            Direction::Back => f64::from(self.sign.back),
        }
    }

    pub fn sensor(&self, direction: Direction, pod: PodIndex) -> Result<&SensorAddress> {
        self.sensors.get(direction, pod)
    }

    pub fn gate(&self, direction: Direction, pod: PodIndex) -> Result<&GateAddress> {
        self.gates.get(direction, pod)
    }

    pub fn servo(&self, direction: Direction, pod: PodIndex) -> Result<&ServoAddress> {
        self.servos.get(direction, pod)
    }

    pub fn sensors(&self) -> &DirectionTable<SensorAddress> {
        &self.sensors
    }

    pub fn gates(&self) -> &DirectionTable<GateAddress> {
        &self.gates
    }

    pub fn servos(&self) -> &DirectionTable<ServoAddress> {
        &self.servos
    }

    /// IO device ids each machine must expose, from the gate and sensor tables
    pub fn io_requirements(&self) -> BTreeMap<usize, BTreeSet<u32>> {
        let mut required: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();
        for (_, _, gate) in self.gates.iter() {
            required.entry(gate.machine).or_default().insert(gate.device);
        }
        for (_, _, sensor) in self.sensors.iter() {
            required.entry(sensor.machine).or_default().insert(sensor.device);
        }
        required
    }
}
