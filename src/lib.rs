//! Pod Conveyor - pod-to-pod transport coordinator
//!
//! Moves a load between pods of a conveyor line driven by several networked
//! motion controllers. Each pod has a presence sensor, a gate and a conveyor
//! segment per travel direction, all addressed through symbolic labels such
//! as `mm1_io2_pin01` or `mm2_drive3`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pod_conveyor::{ConsoleTelemetry, ConveyorConfig, PodService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConveyorConfig::load_from_path("config/default_config.yaml")?;
//!     let (service, _sims) = PodService::simulated(&config, Arc::new(ConsoleTelemetry::pretty())).await?;
//!
//!     service.sequencer().move_between_pods(1, 3).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **label / validate**: label parsing and range checks
//! - **Topology**: pod-to-address tables bound to connected controllers
//! - **GateController / ConveyorDriver / SensorReader**: per-device actuation
//! - **TransportSequencer**: the transport state machine
//! - **PodService**: startup sequence and shutdown
//! - **MotionController**: controller seam, with an in-memory simulation

pub mod cancel;
pub mod config;
pub mod controller;
pub mod conveyor;
pub mod error;
pub mod gate;
pub mod label;
pub mod profile;
pub mod sensor;
pub mod sequencer;
pub mod service;
pub mod sim;
pub mod telemetry;
pub mod topology;
pub mod validate;

pub use service::PodService;
pub use sequencer::{TransportSequencer, TransportState};
pub use config::ConveyorConfig;
pub use topology::{Direction, PodIndex, Topology};
pub use telemetry::{TelemetryPublisher, NoOpTelemetry, ConsoleTelemetry, TransitionEvent};
pub use error::{PodError, Result};

pub use cancel::CancelHandle;
pub use controller::{AxisSetup, IoModules, MotionController};
pub use conveyor::ConveyorDriver;
pub use gate::{GateAction, GateController};
pub use label::{GateAddress, LabelArity, ResolvedAddress, SensorAddress, ServoAddress};
pub use profile::{MotionProfile, Profiles, Timing};
pub use sensor::SensorReader;
pub use sim::{ControllerCall, SimulatedController};
