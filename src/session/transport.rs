//! The capability a session needs from a BLE stack.
//!
//! Every [`Transport`] method is a request: it returns as soon as the
//! operation has been issued, and the outcome arrives later as a
//! [`TransportEvent`] on the [`EventSink`] handed over in
//! [`Transport::connect`]. An `Err` from a request means it could not be
//! issued at all.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::Frame;

/// Identifier matching a write request to its completion event.
pub type WriteId = u64;

/// Resolved characteristic that command frames are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteTarget {
    /// Service containing the characteristic.
    pub service: Uuid,
    /// The writable characteristic.
    pub characteristic: Uuid,
}

/// Outcome of a service discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Both the service and the characteristic were found.
    Resolved(WriteTarget),
    /// The device does not expose the service.
    ServiceMissing(Uuid),
    /// The service exists but lacks the characteristic.
    CharacteristicMissing(Uuid),
}

/// Event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link requested by `connect` is up.
    LinkEstablished,
    /// Service discovery finished.
    ServicesDiscovered(Discovery),
    /// A write finished.
    WriteCompleted {
        /// Id passed to `write`.
        id: WriteId,
        /// `Err` carries the transport's failure description.
        result: std::result::Result<(), String>,
    },
    /// The link dropped, expectedly or not.
    LinkLost,
    /// Non-success status outside of a write.
    Failure {
        /// Description reported by the transport.
        reason: String,
    },
}

/// Sending half of a session's transport event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { tx }
    }

    /// Report an event. Returns false once the session stopped listening.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Check if the session stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Link operations a session drives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request a link. Reports `LinkEstablished` or `Failure` on `events`;
    /// `LinkLost` may follow at any time.
    async fn connect(&self, events: EventSink) -> Result<()>;

    /// Request lookup of `characteristic` within `service`. Reports
    /// `ServicesDiscovered`.
    async fn discover_services(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Request a write of `frame` to `target`. Reports `WriteCompleted` with `id`.
    async fn write(&self, id: WriteId, target: &WriteTarget, frame: Frame) -> Result<()>;

    /// Close the link and release its resources.
    async fn close(&self) -> Result<()>;
}
