//! SBrick sessions.
//!
//! A [`Session`] is the caller's handle to one managed connection. Commands
//! submitted through it are encoded and queued; a background task runs the
//! connection state machine and retransmits the latest frame on every
//! keepalive tick while the session is [`Ready`](SessionState::Ready).

pub mod state;
pub mod transport;

mod actor;
mod keepalive;

#[cfg(test)]
pub(crate) mod testing;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::queue::CommandQueue;

use actor::{Control, SessionActor, Shared};
use keepalive::Keepalive;

pub use state::{Failure, SessionState, StateChange};
pub use transport::{Discovery, EventSink, Transport, TransportEvent, WriteId, WriteTarget};

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Handle to one SBrick connection.
///
/// Dropping the last handle stops the session task and closes the link.
pub struct Session {
    /// State shared with the session task.
    shared: Arc<Shared>,
    /// Request channel to the session task.
    control_tx: mpsc::UnboundedSender<Control>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl Session {
    /// Create a session for the device at `address` and start its task.
    ///
    /// The session starts `Disconnected`; call [`connect`](Self::connect) to
    /// open the link. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `config` does not validate.
    pub fn new(
        address: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (changes_tx, _) = broadcast::channel(config.event_capacity);
        let shared = Arc::new(Shared {
            address: address.into(),
            queue: Mutex::new(CommandQueue::new(config.queue_capacity)),
            state_tx,
            changes_tx,
            last_failure: RwLock::new(None),
        });

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let keepalive = Keepalive::new(config.keepalive_interval)?;
        let actor = SessionActor::new(shared.clone(), transport, control_rx, keepalive);
        tokio::spawn(actor.run());

        Ok(Self {
            shared,
            control_tx,
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Device address.
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    // === Connection ===

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Check if frames are being transmitted.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Failure that ended the last link, cleared by the next connect.
    pub fn last_failure(&self) -> Option<Failure> {
        self.shared.last_failure.read().clone()
    }

    /// Ask the transport to open a link.
    ///
    /// Returns once the request is issued; the session then moves through
    /// `Connecting` and `ServicesDiscovering` to `Ready` as the transport
    /// reports progress. Does nothing unless the session is `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkError`] if the transport rejected the request.
    pub async fn connect(&self) -> Result<()> {
        self.request(Control::Connect).await
    }

    /// Stop the keepalive and close the link.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Control::Disconnect).await
    }

    /// Wait until the session reaches `state`.
    pub async fn wait_for_state(&self, state: SessionState, timeout: Duration) -> Result<()> {
        let mut rx = self.shared.state_tx.subscribe();

        let result = match tokio::time::timeout(timeout, rx.wait_for(|current| *current == state)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => Err(Error::Timeout),
        };
        result
    }

    async fn request(&self, control: fn(oneshot::Sender<Result<()>>) -> Control) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(control(reply_tx))
            .map_err(|_| Error::SessionClosed)?;

        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }

    // === Commands ===

    /// Encode `command` and queue it for the next keepalive tick.
    ///
    /// Commands may be submitted in any state; nothing is transmitted until
    /// the session is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCommand`] if no channel is set and
    /// [`Error::QueueFull`] if the frame was dropped.
    pub fn submit(&self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        debug!("Queueing frame {} for {}", frame, self.shared.address);

        self.shared.queue.lock().enqueue(frame)
    }

    /// Number of frames waiting for transmission.
    pub fn pending_frames(&self) -> usize {
        self.shared.queue.lock().len()
    }

    // === State Changes ===

    /// Subscribe to state changes.
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.shared.changes_tx.subscribe()
    }

    /// Register a callback for state changes.
    pub fn on_state_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.shared.changes_tx.subscribe();

        let handle = tokio::spawn(async move {
            while let Ok(change) = rx.recv().await {
                callback(&change);
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .field("pending_frames", &self.pending_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_err, assert_ok};

    use super::testing::{init_tracing, Call, FakeTransport, Script, TARGET, WAIT};
    use super::transport::MockTransport;
    use super::*;
    use crate::ble::uuids::{REMOTE_CONTROL_COMMANDS_UUID, REMOTE_CONTROL_SERVICE_UUID};
    use crate::protocol::{Channel, Direction, Frame};

    fn session_with(transport: Arc<dyn Transport>) -> Session {
        init_tracing();
        Session::new("00:07:80:2E:41:7A", transport, &SessionConfig::default()).unwrap()
    }

    fn stop_a() -> Command {
        Command::stop().channel(Channel::A).build()
    }

    fn drive_a() -> Command {
        Command::drive()
            .channel(Channel::A, Direction::Clockwise, 0xFF)
            .build()
    }

    fn frame(command: &Command) -> Frame {
        command.encode().unwrap()
    }

    async fn connect_ready(session: &Session) {
        session.connect().await.unwrap();
        session
            .wait_for_state(SessionState::Ready, WAIT)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_transmits_initial_stop_immediately() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        let start = Instant::now();
        connect_ready(&session).await;
        let (_, sent) = fake.next_write().await;

        assert_eq!(sent, frame(&Command::stop_all()));
        assert!(start.elapsed() < SessionConfig::default().keepalive_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_flow_requests() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        connect_ready(&session).await;
        fake.next_write().await;

        let calls = fake.calls();
        assert_eq!(calls[0], Call::Connect);
        assert_eq!(
            calls[1],
            Call::DiscoverServices {
                service: REMOTE_CONTROL_SERVICE_UUID,
                characteristic: REMOTE_CONTROL_COMMANDS_UUID,
            }
        );
        assert!(matches!(calls[2], Call::Write { id: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_resends_last_frame() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());
        let period = SessionConfig::default().keepalive_interval;

        session.submit(&stop_a()).unwrap();
        connect_ready(&session).await;

        let (_, first) = fake.next_write().await;
        assert_eq!(first, frame(&stop_a()));

        let mut previous = Instant::now();
        for _ in 0..5 {
            let (_, sent) = fake.next_write().await;
            assert_eq!(sent, frame(&stop_a()));
            assert!(previous.elapsed() >= period);
            previous = Instant::now();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_submission_wins() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        session.submit(&drive_a()).unwrap();
        session.submit(&stop_a()).unwrap();
        assert_eq!(session.pending_frames(), 2);

        connect_ready(&session).await;

        let (_, first) = fake.next_write().await;
        let (_, second) = fake.next_write().await;
        assert_eq!(first, frame(&stop_a()));
        assert_eq!(second, frame(&stop_a()));
        assert_eq!(session.pending_frames(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_before_ready_is_held() {
        let fake = Arc::new(FakeTransport::manual());
        let session = session_with(fake.clone());

        session.submit(&drive_a()).unwrap();
        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        sleep(Duration::from_secs(2)).await;
        assert!(fake.try_next_write().is_none());

        fake.emit(TransportEvent::LinkEstablished);
        session
            .wait_for_state(SessionState::ServicesDiscovering, WAIT)
            .await
            .unwrap();

        sleep(Duration::from_secs(2)).await;
        assert!(fake.try_next_write().is_none());

        fake.emit(TransportEvent::ServicesDiscovered(Discovery::Resolved(
            TARGET,
        )));
        let (_, sent) = fake.next_write().await;
        assert_eq!(sent, frame(&drive_a()));
        assert!(session.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_disconnects_and_stops_ticks() {
        let fake = Arc::new(FakeTransport::without_write_acks());
        let session = session_with(fake.clone());

        connect_ready(&session).await;
        let (id, _) = fake.next_write().await;

        fake.emit(TransportEvent::WriteCompleted {
            id,
            result: Err("GATT status 133".to_string()),
        });
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        assert!(matches!(
            session.last_failure(),
            Some(Failure::Link { ref reason }) if reason.contains("GATT status 133")
        ));
        assert_eq!(fake.count(|c| matches!(c, Call::Close)), 1);

        sleep(Duration::from_secs(5)).await;
        assert!(fake.try_next_write().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_write_in_flight() {
        let fake = Arc::new(FakeTransport::without_write_acks());
        let session = session_with(fake.clone());

        connect_ready(&session).await;
        let (id, _) = fake.next_write().await;

        sleep(Duration::from_secs(1)).await;
        assert!(fake.try_next_write().is_none());

        // Completion for a write that was never issued changes nothing.
        fake.emit(TransportEvent::WriteCompleted {
            id: id + 100,
            result: Ok(()),
        });
        sleep(Duration::from_secs(1)).await;
        assert!(fake.try_next_write().is_none());
        assert!(session.is_ready());

        fake.emit(TransportEvent::WriteCompleted { id, result: Ok(()) });
        let (next_id, _) = fake.next_write().await;
        assert_eq!(next_id, id + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_lost_disarms_keepalive() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        connect_ready(&session).await;
        fake.next_write().await;

        fake.emit(TransportEvent::LinkLost);
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        assert_eq!(session.last_failure(), Some(Failure::LinkLost));
        sleep(Duration::from_secs(5)).await;
        assert!(fake.try_next_write().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_event() {
        let fake = Arc::new(FakeTransport::manual());
        let session = session_with(fake.clone());

        session.connect().await.unwrap();
        fake.emit(TransportEvent::Failure {
            reason: "GATT failure".to_string(),
        });
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        assert_eq!(
            session.last_failure(),
            Some(Failure::Link {
                reason: "GATT failure".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_missing_fails_session() {
        let fake = Arc::new(FakeTransport::with_script(Script {
            link: true,
            discovery: Some(Discovery::ServiceMissing(REMOTE_CONTROL_SERVICE_UUID)),
            ack_writes: true,
        }));
        let session = session_with(fake.clone());
        let mut changes = session.subscribe_state_changes();

        session.connect().await.unwrap();
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        let failure = session.last_failure().unwrap();
        assert_eq!(
            failure,
            Failure::ServiceNotFound {
                uuid: REMOTE_CONTROL_SERVICE_UUID
            }
        );
        assert!(failure.is_permanent());
        assert_eq!(fake.count(|c| matches!(c, Call::Close)), 1);

        let mut states = Vec::new();
        while let Ok(change) = changes.try_recv() {
            states.push(change.state);
        }
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::ServicesDiscovering,
                SessionState::Error,
                SessionState::Disconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_characteristic_missing_fails_session() {
        let fake = Arc::new(FakeTransport::with_script(Script {
            link: true,
            discovery: Some(Discovery::CharacteristicMissing(
                REMOTE_CONTROL_COMMANDS_UUID,
            )),
            ack_writes: true,
        }));
        let session = session_with(fake.clone());

        session.connect().await.unwrap();
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        assert_eq!(
            session.last_failure(),
            Some(Failure::CharacteristicNotFound {
                uuid: REMOTE_CONTROL_COMMANDS_UUID
            })
        );
        assert!(fake.try_next_write().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_keepalive() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        connect_ready(&session).await;
        fake.next_write().await;

        assert_ok!(session.disconnect().await);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.last_failure(), None);

        sleep(Duration::from_secs(5)).await;
        while fake.try_next_write().is_some() {}
        sleep(Duration::from_secs(5)).await;
        assert!(fake.try_next_write().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_starts_from_stop_all() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());

        session.submit(&drive_a()).unwrap();
        connect_ready(&session).await;
        let (_, sent) = fake.next_write().await;
        assert_eq!(sent, frame(&drive_a()));

        session.disconnect().await.unwrap();
        while fake.try_next_write().is_some() {}

        connect_ready(&session).await;
        let (_, sent) = fake.next_write().await;
        assert_eq!(sent, frame(&Command::stop_all()));
        assert_eq!(fake.count(|c| matches!(c, Call::Connect)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_events_after_teardown_are_ignored() {
        let fake = Arc::new(FakeTransport::manual());
        let session = session_with(fake.clone());

        session.connect().await.unwrap();
        let stale = fake.sink().unwrap();
        session.disconnect().await.unwrap();

        assert!(stale.is_closed());
        assert!(!stale.send(TransportEvent::LinkEstablished));

        session.connect().await.unwrap();
        stale.send(TransportEvent::LinkEstablished);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(fake.count(|c| matches!(c, Call::DiscoverServices { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_rejects_empty_and_full() {
        let session = session_with(Arc::new(FakeTransport::manual()));

        assert!(matches!(
            session.submit(&Command::stop().build()),
            Err(Error::EmptyCommand)
        ));

        session.submit(&stop_a()).unwrap();
        session.submit(&drive_a()).unwrap();
        session.submit(&Command::stop_all()).unwrap();
        assert!(matches!(
            session.submit(&stop_a()),
            Err(Error::QueueFull { capacity: 3 })
        ));
        assert_eq!(session.pending_frames(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_callback() {
        let fake = Arc::new(FakeTransport::responsive());
        let session = session_with(fake.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = session.on_state_changed(move |change| {
            let _ = tx.send((change.previous, change.state));
        });

        connect_ready(&session).await;

        let mut seen = Vec::new();
        while seen.len() < 3 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                (SessionState::Disconnected, SessionState::Connecting),
                (SessionState::Connecting, SessionState::ServicesDiscovering),
                (SessionState::ServicesDiscovering, SessionState::Ready),
            ]
        );

        handle.unregister();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_request_failure() {
        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(|_| {
            Err(Error::LinkError {
                reason: "adapter powered off".to_string(),
            })
        });
        mock.expect_close().times(1).returning(|| Ok(()));
        let session = session_with(Arc::new(mock));

        let result = session.connect().await;
        assert!(matches!(result, Err(Error::LinkError { .. })));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.last_failure(), Some(Failure::Link { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_active() {
        let sinks = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let held = sinks.clone();

        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(move |sink| {
            held.lock().push(sink);
            Ok(())
        });
        mock.expect_close().times(1).returning(|| Ok(()));
        let session = session_with(Arc::new(mock));

        assert_ok!(session.connect().await);
        assert_ok!(session.connect().await);
        assert_eq!(session.state(), SessionState::Connecting);

        assert_ok!(session.disconnect().await);
        assert_ok!(session.disconnect().await);
        assert!(sinks.lock()[0].is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_times_out() {
        let session = session_with(Arc::new(FakeTransport::manual()));

        session.connect().await.unwrap();
        assert_err!(
            session
                .wait_for_state(SessionState::Ready, Duration::from_secs(1))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_after_deferred_tick_sends_immediately() {
        let fake = Arc::new(FakeTransport::without_write_acks());
        let session = session_with(fake.clone());
        let period = SessionConfig::default().keepalive_interval;

        connect_ready(&session).await;
        let (id, _) = fake.next_write().await;

        // The tick at one period falls due while the first write is unanswered.
        sleep(period + Duration::from_millis(50)).await;
        assert!(fake.try_next_write().is_none());

        let acked_at = Instant::now();
        fake.emit(TransportEvent::WriteCompleted { id, result: Ok(()) });
        let (next_id, _) = fake.next_write().await;

        assert_eq!(next_id, id + 1);
        assert_eq!(acked_at.elapsed(), Duration::ZERO);
    }

    /// Counts requests a mocked transport receives.
    #[derive(Default)]
    struct Requests {
        writes: AtomicUsize,
        closes: AtomicUsize,
    }

    /// Mock that links on connect and counts writes and closes. The returned slot
    /// holds the event sink of the current link.
    fn linking_mock(
        requests: &Arc<Requests>,
    ) -> (MockTransport, Arc<parking_lot::Mutex<Option<EventSink>>>) {
        let slot = Arc::new(parking_lot::Mutex::new(None));
        let mut mock = MockTransport::new();

        let held = slot.clone();
        mock.expect_connect().returning(move |sink: EventSink| {
            sink.send(TransportEvent::LinkEstablished);
            *held.lock() = Some(sink);
            Ok(())
        });

        let counted = requests.clone();
        mock.expect_close().returning(move || {
            counted.closes.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });

        (mock, slot)
    }

    async fn assert_link_failure(session: &Session, requests: &Requests, writes: usize) {
        session
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
            .unwrap();

        assert!(matches!(session.last_failure(), Some(Failure::Link { .. })));
        assert_eq!(requests.closes.load(AtomicOrdering::SeqCst), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(requests.writes.load(AtomicOrdering::SeqCst), writes);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_request_failure() {
        let requests = Arc::new(Requests::default());
        let (mut mock, _slot) = linking_mock(&requests);

        mock.expect_discover_services().returning(|_, _| {
            Err(Error::LinkError {
                reason: "GATT busy".to_string(),
            })
        });
        let counted = requests.clone();
        mock.expect_write().returning(move |_, _, _| {
            counted.writes.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });

        let session = session_with(Arc::new(mock));
        session.connect().await.unwrap();

        assert_link_failure(&session, &requests, 0).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_request_failure() {
        let requests = Arc::new(Requests::default());
        let (mut mock, slot) = linking_mock(&requests);

        let resolver = slot.clone();
        mock.expect_discover_services().returning(move |_, _| {
            if let Some(sink) = resolver.lock().as_ref() {
                sink.send(TransportEvent::ServicesDiscovered(Discovery::Resolved(
                    TARGET,
                )));
            }
            Ok(())
        });
        let counted = requests.clone();
        mock.expect_write().returning(move |_, _, _| {
            counted.writes.fetch_add(1, AtomicOrdering::SeqCst);
            Err(Error::LinkError {
                reason: "not connected".to_string(),
            })
        });

        let session = session_with(Arc::new(mock));
        session.connect().await.unwrap();

        assert_link_failure(&session, &requests, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_dropping_event_channel() {
        let requests = Arc::new(Requests::default());
        let mut mock = MockTransport::new();

        // The sink is dropped as soon as connect returns.
        mock.expect_connect().returning(|_| Ok(()));
        let counted = requests.clone();
        mock.expect_close().returning(move || {
            counted.closes.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });
        let counted = requests.clone();
        mock.expect_write().returning(move |_, _, _| {
            counted.writes.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });

        let session = session_with(Arc::new(mock));
        session.connect().await.unwrap();

        assert_link_failure(&session, &requests, 0).await;
    }
}
