//! Pod Conveyor Control
//!
//! Command-line front end for a pod conveyor line: transports, manual gate
//! and sensor access, stop-all and configuration checks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pod_conveyor::{
    ConsoleTelemetry, ConveyorConfig, Direction, GateAction, MotionController, NoOpTelemetry,
    PodService, TelemetryPublisher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "podctl")]
#[command(about = "Pod-to-pod conveyor transport control")]
#[command(version)]
struct Args {
    /// Path to the line configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Print every transport state transition as JSON on stdout
    #[arg(long, global = true)]
    json_events: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a load from one pod to another
    Move {
        #[arg(long)]
        from: usize,
        #[arg(long)]
        to: usize,
        /// Abort the transport after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Open or close a single gate
    Gate {
        #[arg(long)]
        pod: usize,
        /// forward or back
        #[arg(long)]
        direction: Direction,
        /// open or close
        #[arg(long)]
        action: GateAction,
    },
    /// Read a single presence sensor
    Sensor {
        #[arg(long)]
        pod: usize,
        /// forward or back
        #[arg(long)]
        direction: Direction,
    },
    /// Stop every conveyor on the line
    StopAll,
    /// Validate the configuration and print the resolved topology
    Check,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("PODCTL_CONFIG").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.get_config_path();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    info!("Using config: {}", config_path);
    let config = ConveyorConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let telemetry: Arc<dyn TelemetryPublisher> = if args.json_events {
        Arc::new(ConsoleTelemetry::new())
    } else {
        Arc::new(NoOpTelemetry)
    };

    warn!("No hardware driver linked, running against simulated controllers");
    let (service, _sims) = PodService::simulated(&config, telemetry)
        .await
        .context("Line startup failed")?;

    let command = run_command(&service, &args.command);
    tokio::pin!(command);

    tokio::select! {
        result = &mut command => result,
        _ = shutdown_signal() => {
            warn!("Termination signal received, stopping all conveyors");
            service.shutdown().await.context("Stop-all on shutdown failed")?;
            info!("Shutdown complete");
            Ok(())
        }
    }
}

async fn run_command(service: &PodService, command: &Commands) -> Result<()> {
    let sequencer = service.sequencer();

    match command {
        Commands::Move { from, to, timeout } => {
            let result = match timeout {
                Some(secs) => {
                    sequencer
                        .move_between_pods_with_timeout(*from, *to, Duration::from_secs(*secs))
                        .await
                }
                None => sequencer.move_between_pods(*from, *to).await,
            };
            result.with_context(|| format!("Transport {} -> {} failed", from, to))?;
            info!("Transport {} -> {} done", from, to);
        }
        Commands::Gate { pod, direction, action } => {
            sequencer
                .gates()
                .set_gate_at(*pod, *direction, *action)
                .await
                .with_context(|| format!("Failed to {} {} gate of pod {}", action, direction, pod))?;
        }
        Commands::Sensor { pod, direction } => {
            let present = sequencer
                .sensors()
                .read_at(*pod, *direction)
                .await
                .with_context(|| format!("Failed to read {} sensor of pod {}", direction, pod))?;
            println!("{}", if present { "present" } else { "clear" });
        }
        Commands::StopAll => {
            sequencer.stop_all_conveyors().await.context("Stop-all failed")?;
        }
        Commands::Check => {
            print_topology(service);
        }
    }
    Ok(())
}

fn print_topology(service: &PodService) {
    let topology = service.topology();
    println!(
        "{} pod(s), {} machine(s), {} axes per machine",
        topology.n_pods(),
        topology.machine_count(),
        topology.axes_per_machine()
    );

    for (index, machine) in topology.machines().iter().enumerate() {
        println!("machine {}: {}", index + 1, machine.name());
    }
    for direction in Direction::ALL {
        for pod in 1..=topology.n_pods() {
            let (Ok(sensor), Ok(gate), Ok(servo)) = (
                topology.sensor(direction, pod),
                topology.gate(direction, pod),
                topology.servo(direction, pod),
            ) else {
                continue;
            };
            println!(
                "pod {} {}: sensor {:<14} gate {:<14} servo {}",
                pod, direction, sensor.label, gate.label, servo.label
            );
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
