//! Scripted in-memory transport for session tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ble::uuids::{REMOTE_CONTROL_COMMANDS_UUID, REMOTE_CONTROL_SERVICE_UUID};
use crate::error::Result;
use crate::protocol::Frame;
use crate::session::transport::{
    Discovery, EventSink, Transport, TransportEvent, WriteId, WriteTarget,
};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) const TARGET: WriteTarget = WriteTarget {
    service: REMOTE_CONTROL_SERVICE_UUID,
    characteristic: REMOTE_CONTROL_COMMANDS_UUID,
};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A request the session issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Connect,
    DiscoverServices { service: Uuid, characteristic: Uuid },
    Write { id: WriteId, frame: Frame },
    Close,
}

/// How the fake answers requests. `None` means the test answers by hand.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub(crate) link: bool,
    pub(crate) discovery: Option<Discovery>,
    pub(crate) ack_writes: bool,
}

struct Inner {
    sink: Option<EventSink>,
    calls: Vec<Call>,
}

pub(crate) struct FakeTransport {
    script: Script,
    inner: Mutex<Inner>,
    writes_tx: mpsc::UnboundedSender<(WriteId, Frame)>,
    writes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(WriteId, Frame)>>,
}

impl FakeTransport {
    pub(crate) fn with_script(script: Script) -> Self {
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();

        Self {
            script,
            inner: Mutex::new(Inner {
                sink: None,
                calls: Vec::new(),
            }),
            writes_tx,
            writes_rx: tokio::sync::Mutex::new(writes_rx),
        }
    }

    /// Answers nothing on its own.
    pub(crate) fn manual() -> Self {
        Self::with_script(Script {
            link: false,
            discovery: None,
            ack_writes: false,
        })
    }

    /// Links, resolves the SBrick characteristic and acknowledges every write.
    pub(crate) fn responsive() -> Self {
        Self::with_script(Script {
            link: true,
            discovery: Some(Discovery::Resolved(TARGET)),
            ack_writes: true,
        })
    }

    /// Like `responsive`, but writes stay in flight until acknowledged by hand.
    pub(crate) fn without_write_acks() -> Self {
        Self::with_script(Script {
            ack_writes: false,
            ..Self::responsive().script
        })
    }

    /// Report an event on the current link.
    pub(crate) fn emit(&self, event: TransportEvent) {
        let sink = self.inner.lock().sink.clone();
        if let Some(sink) = sink {
            sink.send(event);
        }
    }

    /// Wait for the next write request.
    pub(crate) async fn next_write(&self) -> (WriteId, Frame) {
        let recv = async { self.writes_rx.lock().await.recv().await };
        tokio::time::timeout(WAIT, recv)
            .await
            .expect("no write within timeout")
            .expect("write channel closed")
    }

    /// A write request that already happened, if any.
    pub(crate) fn try_next_write(&self) -> Option<(WriteId, Frame)> {
        self.writes_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Sink of the current link.
    pub(crate) fn sink(&self) -> Option<EventSink> {
        self.inner.lock().sink.clone()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub(crate) fn count(&self, call: fn(&Call) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| call(c)).count()
    }

    fn record(&self, call: Call) -> Option<EventSink> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        inner.sink.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, events: EventSink) -> Result<()> {
        self.inner.lock().sink = Some(events.clone());
        self.record(Call::Connect);

        if self.script.link {
            events.send(TransportEvent::LinkEstablished);
        }
        Ok(())
    }

    async fn discover_services(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        let sink = self.record(Call::DiscoverServices {
            service,
            characteristic,
        });

        if let (Some(sink), Some(discovery)) = (sink, self.script.discovery.clone()) {
            sink.send(TransportEvent::ServicesDiscovered(discovery));
        }
        Ok(())
    }

    async fn write(&self, id: WriteId, _target: &WriteTarget, frame: Frame) -> Result<()> {
        let sink = self.record(Call::Write {
            id,
            frame: frame.clone(),
        });
        let _ = self.writes_tx.send((id, frame));

        if let (Some(sink), true) = (sink, self.script.ack_writes) {
            sink.send(TransportEvent::WriteCompleted { id, result: Ok(()) });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        self.inner.lock().sink = None;
        Ok(())
    }
}
