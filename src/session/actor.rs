//! Session task: the connection state machine.
//!
//! One task per session owns the transport, the write target and the
//! keepalive timer. Caller requests, transport events and keepalive ticks are
//! handled one at a time, in that priority order.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::ble::uuids::{REMOTE_CONTROL_COMMANDS_UUID, REMOTE_CONTROL_SERVICE_UUID};
use crate::error::Result;
use crate::protocol::Frame;
use crate::queue::CommandQueue;
use crate::session::keepalive::Keepalive;
use crate::session::state::{Failure, SessionState, StateChange};
use crate::session::transport::{
    Discovery, EventSink, Transport, TransportEvent, WriteId, WriteTarget,
};

/// Request from a session handle to its task.
pub(crate) enum Control {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<Result<()>>),
}

/// State shared between a session handle and its task.
pub(crate) struct Shared {
    /// Device address.
    pub(crate) address: String,
    /// Frames waiting for the next tick.
    pub(crate) queue: Mutex<CommandQueue>,
    /// Current state.
    pub(crate) state_tx: watch::Sender<SessionState>,
    /// State change events.
    pub(crate) changes_tx: broadcast::Sender<StateChange>,
    /// Failure that ended the last link, if any.
    pub(crate) last_failure: RwLock<Option<Failure>>,
}

/// The write waiting for its completion event.
struct InFlight {
    id: WriteId,
    frame: Frame,
}

pub(crate) struct SessionActor {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    /// Events of the current link; replaced on every connect.
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    keepalive: Keepalive,
    target: Option<WriteTarget>,
    in_flight: Option<InFlight>,
    /// A tick fell due while a write was in flight.
    tick_deferred: bool,
    next_write_id: WriteId,
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        transport: Arc<dyn Transport>,
        control_rx: mpsc::UnboundedReceiver<Control>,
        keepalive: Keepalive,
    ) -> Self {
        Self {
            shared,
            transport,
            control_rx,
            events: None,
            keepalive,
            target: None,
            in_flight: None,
            tick_deferred: false,
            next_write_id: 0,
        }
    }

    /// Process requests and events until every session handle is gone.
    pub(crate) async fn run(mut self) {
        debug!("Session task for {} started", self.shared.address);

        loop {
            tokio::select! {
                biased;

                control = self.control_rx.recv() => match control {
                    Some(control) => self.handle_control(control).await,
                    None => break,
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => self.handle_events_closed().await,
                },
                _ = self.keepalive.tick() => self.on_tick().await,
            }
        }

        if self.state().is_active() {
            if let Err(e) = self.release().await {
                warn!("Error closing link to {}: {}", self.shared.address, e);
            }
            self.set_state(SessionState::Disconnected, None);
        }

        debug!("Session task for {} ended", self.shared.address);
    }

    fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Update the state and emit an event.
    fn set_state(&self, new_state: SessionState, failure: Option<Failure>) {
        let previous = self.shared.state_tx.send_replace(new_state);

        if previous != new_state {
            debug!(
                "Session {} state changed: {} -> {}",
                self.shared.address, previous, new_state
            );

            let _ = self.shared.changes_tx.send(StateChange {
                address: self.shared.address.clone(),
                previous,
                state: new_state,
                failure,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Control::Disconnect(reply) => {
                let result = self.disconnect().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Disconnected {
            debug!("Session {} already {}", self.shared.address, state);
            return Ok(());
        }

        info!("Connecting to SBrick {}", self.shared.address);

        *self.shared.last_failure.write() = None;

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.set_state(SessionState::Connecting, None);

        if let Err(e) = self.transport.connect(EventSink::new(tx)).await {
            let failure = Failure::link(e);
            self.fail(failure.clone()).await;
            return Err(failure.into());
        }

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.state().is_active() {
            return Ok(());
        }

        info!("Disconnecting from SBrick {}", self.shared.address);

        let result = self.release().await;
        self.set_state(SessionState::Disconnected, None);
        result
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        let state = self.state();

        match event {
            TransportEvent::LinkEstablished => {
                if state != SessionState::Connecting {
                    debug!("Ignoring link established while {}", state);
                    return;
                }

                info!("Connected to SBrick {}", self.shared.address);
                self.set_state(SessionState::ServicesDiscovering, None);

                if let Err(e) = self
                    .transport
                    .discover_services(REMOTE_CONTROL_SERVICE_UUID, REMOTE_CONTROL_COMMANDS_UUID)
                    .await
                {
                    self.fail(Failure::link(e)).await;
                }
            }
            TransportEvent::ServicesDiscovered(discovery) => {
                if state != SessionState::ServicesDiscovering {
                    debug!("Ignoring service discovery result while {}", state);
                    return;
                }

                match discovery {
                    Discovery::Resolved(target) => {
                        debug!(
                            "Resolved characteristic {} in service {}",
                            target.characteristic, target.service
                        );
                        self.target = Some(target);
                        self.set_state(SessionState::Ready, None);
                        self.keepalive.arm();
                        info!("SBrick {} ready", self.shared.address);
                    }
                    Discovery::ServiceMissing(uuid) => {
                        self.fail(Failure::ServiceNotFound { uuid }).await;
                    }
                    Discovery::CharacteristicMissing(uuid) => {
                        self.fail(Failure::CharacteristicNotFound { uuid }).await;
                    }
                }
            }
            TransportEvent::WriteCompleted { id, result } => {
                self.on_write_completed(id, result).await;
            }
            TransportEvent::LinkLost => {
                if !state.is_active() {
                    debug!("Ignoring link lost while {}", state);
                    return;
                }

                info!("Connection to SBrick {} lost", self.shared.address);
                if let Err(e) = self.release().await {
                    warn!("Error closing link to {}: {}", self.shared.address, e);
                }
                *self.shared.last_failure.write() = Some(Failure::LinkLost);
                self.set_state(SessionState::Disconnected, Some(Failure::LinkLost));
            }
            TransportEvent::Failure { reason } => {
                if !state.is_active() {
                    debug!("Ignoring transport failure while {}: {}", state, reason);
                    return;
                }

                self.fail(Failure::Link { reason }).await;
            }
        }
    }

    async fn handle_events_closed(&mut self) {
        self.events = None;

        if self.state().is_active() {
            self.fail(Failure::link("transport dropped its event channel"))
                .await;
        }
    }

    async fn on_write_completed(&mut self, id: WriteId, result: std::result::Result<(), String>) {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.id == id => match result {
                Ok(()) => {
                    trace!("Write {} to {} completed", id, self.shared.address);
                    self.keepalive.confirm(in_flight.frame);

                    // Catch up on a tick skipped while waiting, so the gap
                    // between writes stays within one period plus latency.
                    if std::mem::take(&mut self.tick_deferred) {
                        self.transmit().await;
                    }
                }
                Err(reason) => {
                    self.fail(Failure::Link {
                        reason: format!("write failed: {}", reason),
                    })
                    .await;
                }
            },
            other => {
                self.in_flight = other;
                debug!("Ignoring completion of unknown write {}", id);
            }
        }
    }

    async fn on_tick(&mut self) {
        let state = self.state();
        if !state.is_ready() {
            trace!("Keepalive tick skipped, session is {}", state);
            return;
        }

        if let Some(in_flight) = &self.in_flight {
            trace!("Keepalive tick deferred, write {} in flight", in_flight.id);
            self.tick_deferred = true;
            return;
        }

        self.transmit().await;
    }

    /// Write the next frame to the device.
    async fn transmit(&mut self) {
        let Some(target) = self.target else {
            return;
        };

        let frame = {
            let mut queue = self.shared.queue.lock();
            self.keepalive.next_frame(&mut queue)
        };

        let id = self.next_write_id;
        self.next_write_id += 1;

        trace!("Write {} to {}: {}", id, self.shared.address, frame);
        self.in_flight = Some(InFlight {
            id,
            frame: frame.clone(),
        });

        if let Err(e) = self.transport.write(id, &target, frame).await {
            self.fail(Failure::link(e)).await;
        }
    }

    /// Error excursion: clean up and fall back to `Disconnected`.
    async fn fail(&mut self, failure: Failure) {
        warn!("Session {} failed: {}", self.shared.address, failure);

        self.set_state(SessionState::Error, Some(failure.clone()));
        if let Err(e) = self.release().await {
            warn!("Error closing link to {}: {}", self.shared.address, e);
        }

        *self.shared.last_failure.write() = Some(failure.clone());
        self.set_state(SessionState::Disconnected, Some(failure));
    }

    /// Stop the keepalive and close the link.
    async fn release(&mut self) -> Result<()> {
        if self.keepalive.is_armed() {
            debug!("Keepalive for {} stopped", self.shared.address);
        }

        self.keepalive.disarm();
        self.keepalive.reset();
        self.in_flight = None;
        self.tick_deferred = false;
        self.target = None;
        self.events = None;

        self.transport.close().await
    }
}
