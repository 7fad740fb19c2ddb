//! Symbolic label resolution
//!
//! Labels such as `mm1_io2_pin01` or `mm2_drive3` encode a physical address in
//! their digit characters. Reading the digits left to right gives the machine
//! number (1-indexed), the IO device network id or axis number, and zero to two
//! pin numbers. Resolution is purely syntactic; range checks live in
//! [`crate::validate`].

use crate::{PodError, Result};
use serde::Serialize;

/// Number of digits each label role must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelArity {
    /// machine, device, close pin, open pin
    Gate,
    /// machine, device, pin
    Sensor,
    /// machine, axis
    Servo,
}

impl LabelArity {
    pub fn digits(self) -> usize {
        match self {
            LabelArity::Gate => 4,
            LabelArity::Sensor => 3,
            LabelArity::Servo => 2,
        }
    }
}

/// Structured address decoded from a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAddress {
    /// Machine number as written in the label (1-indexed)
    pub machine_number: u32,
    /// IO device network id or axis number
    pub device_or_axis: u32,
    pub pins: Vec<u32>,
}

impl ResolvedAddress {
    /// Zero-indexed machine position, `None` when the label names machine 0.
    pub fn machine_index(&self) -> Option<usize> {
        (self.machine_number as usize).checked_sub(1)
    }
}

/// Decode `label` into its address fields.
///
/// Every ASCII digit is taken as one field, in order of appearance. The label
/// must carry exactly as many digits as `arity` requires.
pub fn resolve(label: &str, arity: LabelArity) -> Result<ResolvedAddress> {
    let digits: Vec<u32> = label.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != arity.digits() {
        return Err(PodError::MalformedLabel {
            label: label.to_string(),
            expected: arity.digits(),
            found: digits.len(),
        });
    }

    Ok(ResolvedAddress {
        machine_number: digits[0],
        device_or_axis: digits[1],
        pins: digits[2..].to_vec(),
    })
}

/// Gate actuator: a pair of digital outputs on one IO module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateAddress {
    pub label: String,
    pub machine: usize,
    pub device: u32,
    pub pin_close: u32,
    pub pin_open: u32,
}

/// Presence sensor: a single digital input on one IO module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorAddress {
    pub label: String,
    pub machine: usize,
    pub device: u32,
    pub pin: u32,
}

/// Conveyor segment: one drive axis on one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServoAddress {
    pub label: String,
    pub machine: usize,
    pub axis: u32,
}

impl GateAddress {
    /// Resolve and range-check a gate label against `machines` controllers.
    pub fn parse(label: &str, machines: usize) -> Result<Self> {
        let resolved = resolve(label, LabelArity::Gate)?;
        let machine = crate::validate::machine(resolved.machine_number, machines)?;
        crate::validate::io_board(resolved.device_or_axis)?;
        crate::validate::io_pin(resolved.pins[0])?;
        crate::validate::io_pin(resolved.pins[1])?;

        Ok(Self {
            label: label.to_string(),
            machine,
            device: resolved.device_or_axis,
            pin_close: resolved.pins[0],
            pin_open: resolved.pins[1],
        })
    }
}

impl SensorAddress {
    /// Resolve and range-check a sensor label against `machines` controllers.
    pub fn parse(label: &str, machines: usize) -> Result<Self> {
        let resolved = resolve(label, LabelArity::Sensor)?;
        let machine = crate::validate::machine(resolved.machine_number, machines)?;
        crate::validate::io_board(resolved.device_or_axis)?;
        crate::validate::io_pin(resolved.pins[0])?;

        Ok(Self {
            label: label.to_string(),
            machine,
            device: resolved.device_or_axis,
            pin: resolved.pins[0],
        })
    }
}

impl ServoAddress {
    /// Resolve and range-check a servo label against `machines` controllers.
    pub fn parse(label: &str, machines: usize) -> Result<Self> {
        let resolved = resolve(label, LabelArity::Servo)?;
        let machine = crate::validate::machine(resolved.machine_number, machines)?;
        crate::validate::axis(resolved.device_or_axis)?;

        Ok(Self {
            label: label.to_string(),
            machine,
            axis: resolved.device_or_axis,
        })
    }
}
