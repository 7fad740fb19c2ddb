//! Error types for pod transport operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodError>;

#[derive(Error, Debug)]
pub enum PodError {
    #[error("Malformed label '{label}': expected {expected} digits, found {found}")]
    MalformedLabel {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("Pod number {pod} out of range. Permitted values are [1, {n_pods}]")]
    PodOutOfRange { pod: usize, n_pods: usize },

    #[error("Machine number {machine} out of range. {connected} machine(s) connected")]
    MachineOutOfRange { machine: u32, connected: usize },

    #[error("Axis number {axis} out of range. Permitted values are [1, 2, 3]")]
    AxisOutOfRange { axis: u32 },

    #[error("IO pin number {pin} out of range. Permitted values are [0, 1, 2, 3]")]
    IoPinOutOfRange { pin: u32 },

    #[error("IO board number {board} out of range. Permitted values are [0, 1, 2, 3]")]
    IoBoardOutOfRange { board: u32 },

    #[error("Unknown gate action '{0}'. Expected 'open' or 'close'")]
    UnknownAction(String),

    #[error("No IO modules detected on machine {}", .machine + 1)]
    NoIoModules { machine: usize },

    #[error("IO module {device} not found on machine {}", .machine + 1)]
    IoModuleMissing { machine: usize, device: u32 },

    #[error("Obstacle not cleared at sensor {sensor} within {timeout_ms} ms")]
    ObstacleNotCleared { sensor: String, timeout_ms: u128 },

    #[error("Coordinator halted after a fatal error; acknowledge the fault before new transports")]
    Halted,

    #[error("Transport cancelled")]
    Cancelled,

    #[error("Transport did not complete within {timeout_ms} ms")]
    MoveTimeout { timeout_ms: u128 },

    /// `machine` is the 0-indexed controller position; messages show the 1-indexed number
    #[error("Controller error on machine {}: {source}", .machine + 1)]
    Controller {
        machine: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PodError {
    /// True for errors raised by label resolution or range validation.
    pub fn is_address_error(&self) -> bool {
        matches!(
            self,
            PodError::MalformedLabel { .. }
                | PodError::PodOutOfRange { .. }
                | PodError::MachineOutOfRange { .. }
                | PodError::AxisOutOfRange { .. }
                | PodError::IoPinOutOfRange { .. }
                | PodError::IoBoardOutOfRange { .. }
        )
    }

    pub(crate) fn controller(machine: usize, source: anyhow::Error) -> Self {
        PodError::Controller { machine, source }
    }
}
