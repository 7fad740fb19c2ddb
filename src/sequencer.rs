//! Transport Sequencer - pod-to-pod transport state machine
//!
//! A transport runs strictly in order:
//! 1. Close every gate on the line
//! 2. Open the travel-direction gates along the path
//! 3. Start every path segment at cruise speed
//! 4. Poll the destination sensor until the load has cleared it
//! 5. Close the destination gate and settle the load at fine speed
//! 6. Stop every path segment
//!
//! Any error leaves the sequencer in [`TransportState::Fatal`]. Further
//! transports are refused until the host calls
//! [`TransportSequencer::acknowledge_fault`].
//!
//! Every request carries its own [`CancelHandle`]. A timeout or
//! [`TransportSequencer::cancel_current`] only ever aborts one transport.

use crate::cancel::CancelHandle;
use crate::conveyor::ConveyorDriver;
use crate::gate::{GateAction, GateController};
use crate::profile::{Profiles, Timing};
use crate::sensor::SensorReader;
use crate::telemetry::{NoOpTelemetry, TelemetryPublisher, TransitionEvent};
use crate::topology::{Direction, PodIndex, Topology};
use crate::{validate, PodError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Idle,
    GatesClosing,
    GatesOpening,
    Conveying,
    Settling,
    Stopping,
    Fatal,
}

/// One transport request with its own cancel scope
#[derive(Debug)]
struct Request {
    id: Uuid,
    from: PodIndex,
    to: PodIndex,
    direction: Option<Direction>,
    cancel: CancelHandle,
    /// Set once the request holds the line
    started: AtomicBool,
}

impl Request {
    fn new(from: PodIndex, to: PodIndex) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            direction: Direction::between(from, to),
            cancel: CancelHandle::new(),
            started: AtomicBool::new(false),
        }
    }
}

/// Publishes the running request's cancel handle, cleared on drop
struct ActiveRequest<'a> {
    slot: &'a Mutex<Option<CancelHandle>>,
}

impl<'a> ActiveRequest<'a> {
    fn register(slot: &'a Mutex<Option<CancelHandle>>, cancel: &CancelHandle) -> Self {
        *lock(slot) = Some(cancel.clone());
        Self { slot }
    }
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TransportSequencer {
    topology: Arc<Topology>,
    gates: GateController,
    conveyors: ConveyorDriver,
    sensors: SensorReader,
    profiles: Profiles,
    timing: Timing,
    telemetry: Arc<dyn TelemetryPublisher>,
    state: Mutex<TransportState>,
    busy: tokio::sync::Mutex<()>,
    active: Mutex<Option<CancelHandle>>,
}

impl TransportSequencer {
    pub fn new(topology: Arc<Topology>, profiles: Profiles, timing: Timing) -> Self {
        Self {
            gates: GateController::new(Arc::clone(&topology), timing),
            conveyors: ConveyorDriver::new(Arc::clone(&topology)),
            sensors: SensorReader::new(Arc::clone(&topology)),
            topology,
            profiles,
            timing,
            telemetry: Arc::new(NoOpTelemetry),
            state: Mutex::new(TransportState::Idle),
            busy: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryPublisher>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> TransportState {
        *lock(&self.state)
    }

    fn set_state(&self, state: TransportState) {
        *lock(&self.state) = state;
    }

    /// Clear a fatal fault so new transports are accepted.
    ///
    /// Returns `false` if the sequencer was not in the fatal state.
    pub fn acknowledge_fault(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == TransportState::Fatal {
            warn!("Fatal fault acknowledged, sequencer back to idle");
            *state = TransportState::Idle;
            true
        } else {
            false
        }
    }

    /// Cancel the transport currently holding the line.
    ///
    /// Returns `false` when no transport is running. Queued transports are
    /// not affected.
    pub fn cancel_current(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(cancel) => {
                warn!("Cancelling running transport");
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn gates(&self) -> &GateController {
        &self.gates
    }

    pub fn conveyors(&self) -> &ConveyorDriver {
        &self.conveyors
    }

    pub fn sensors(&self) -> &SensorReader {
        &self.sensors
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    /// Move a load from `from` to `to`.
    ///
    /// Identical pods are a no-op. The call fails with `Halted` while an
    /// earlier fault is unacknowledged. Transports run one at a time; later
    /// callers wait for the line.
    pub async fn move_between_pods(&self, from: PodIndex, to: PodIndex) -> Result<()> {
        let request = Request::new(from, to);
        self.execute(&request).await
    }

    /// [`Self::move_between_pods`] bounded by `timeout`, queueing included.
    ///
    /// On expiry only this transport is cancelled. If it does not unwind
    /// within the cancel grace it is abandoned; in both cases every conveyor
    /// is stopped if the transport had started, and `MoveTimeout` is returned.
    pub async fn move_between_pods_with_timeout(
        &self,
        from: PodIndex,
        to: PodIndex,
        timeout: Duration,
    ) -> Result<()> {
        let request = Request::new(from, to);
        let timed_out = || PodError::MoveTimeout {
            timeout_ms: timeout.as_millis(),
        };

        let mut transport = Box::pin(self.execute(&request));
        if let Ok(result) = tokio::time::timeout(timeout, &mut transport).await {
            return result;
        }

        warn!("Transport {} -> {} exceeded {:?}, cancelling", from, to, timeout);
        request.cancel.cancel();
        match tokio::time::timeout(self.timing.cancel_grace, &mut transport).await {
            Ok(Err(PodError::Cancelled)) => Err(timed_out()),
            Ok(other) => other,
            Err(_) => {
                drop(transport);
                if !request.started.load(Ordering::SeqCst) {
                    return Err(timed_out());
                }
                error!(
                    "Transport {} -> {} did not unwind within {:?}, abandoning it",
                    from, to, self.timing.cancel_grace
                );
                let err = timed_out();
                self.fail(&request, &err).await;
                Err(err)
            }
        }
    }

    /// Stop every conveyor of every pod in both directions.
    ///
    /// Safe to call at any time, including while a transport is running or
    /// when nothing is moving.
    pub async fn stop_all_conveyors(&self) -> Result<()> {
        self.conveyors.stop_all(self.profiles.stop_deceleration).await
    }

    async fn execute(&self, request: &Request) -> Result<()> {
        let _busy = tokio::select! {
            guard = self.busy.lock() => guard,
            _ = request.cancel.cancelled() => return Err(PodError::Cancelled),
        };
        request.cancel.check()?;
        if self.state() == TransportState::Fatal {
            return Err(PodError::Halted);
        }
        let _active = ActiveRequest::register(&self.active, &request.cancel);
        request.started.store(true, Ordering::SeqCst);

        let result = self.run(request).await;
        if let Err(e) = &result {
            self.fail(request, e).await;
        }
        result
    }

    /// Enter `Fatal`, stopping every conveyor first when the transport was aborted mid-motion
    async fn fail(&self, request: &Request, error: &PodError) {
        error!("Transport {} -> {} failed: {}", request.from, request.to, error);
        if matches!(
            error,
            PodError::Cancelled | PodError::ObstacleNotCleared { .. } | PodError::MoveTimeout { .. }
        ) {
            warn!("Stopping all conveyors after aborted transport");
            match tokio::time::timeout(self.timing.cancel_grace, self.stop_all_conveyors()).await {
                Ok(Ok(())) => {}
                Ok(Err(stop_error)) => error!("Stop-all after abort failed: {}", stop_error),
                Err(_) => error!("Stop-all after abort did not finish within {:?}", self.timing.cancel_grace),
            }
        }
        self.transition(request, TransportState::Fatal, Some(error)).await;
    }

    async fn run(&self, request: &Request) -> Result<()> {
        let n_pods = self.topology.n_pods();
        validate::pod(request.from, n_pods)?;
        validate::pod(request.to, n_pods)?;

        let Some(direction) = request.direction else {
            info!("No movement to be performed, pod numbers are the same");
            return Ok(());
        };
        let cancel = &request.cancel;
        let first = request.from.min(request.to);
        let last = request.from.max(request.to);
        info!("Transport {} -> {} ({})", request.from, request.to, direction);

        self.transition(request, TransportState::GatesClosing, None).await;
        self.gates.move_all(GateAction::Close).await?;
        cancel.check()?;

        self.transition(request, TransportState::GatesOpening, None).await;
        for pod in first..=last {
            self.gates.set_gate_at(pod, direction, GateAction::Open).await?;
        }
        cancel.check()?;

        self.transition(request, TransportState::Conveying, None).await;
        for pod in first..=last {
            self.conveyors.start_at(pod, direction, self.profiles.cruise).await?;
        }
        let sensor = self.topology.sensor(direction, request.to)?;
        self.sensors
            .wait_until_clear(sensor, self.timing.poll_interval, self.timing.poll_timeout, cancel)
            .await?;

        self.transition(request, TransportState::Settling, None).await;
        self.gates.set_gate_at(request.to, direction, GateAction::Close).await?;
        self.conveyors.start_at(request.to, direction, self.profiles.fine).await?;
        cancel.sleep(self.timing.approach_window).await?;
        for pod in first..=last {
            self.conveyors.start_at(pod, direction, self.profiles.fine).await?;
        }
        cancel.sleep(self.timing.coast).await?;

        self.transition(request, TransportState::Stopping, None).await;
        for pod in first..=last {
            self.conveyors.stop_at(pod, direction, self.profiles.stop_deceleration).await?;
        }

        self.transition(request, TransportState::Idle, None).await;
        info!("Transport {} -> {} complete", request.from, request.to);
        Ok(())
    }

    async fn transition(&self, request: &Request, state: TransportState, error: Option<&PodError>) {
        self.set_state(state);
        info!("Transport state: {:?}", state);

        let mut event = TransitionEvent::new(request.id, request.from, request.to, request.direction, state);
        if let Some(e) = error {
            event = event.with_error(e);
        }
        if let Err(e) = self.telemetry.publish_transition(&event).await {
            warn!("Failed to publish transport event: {}", e);
        }
    }
}
