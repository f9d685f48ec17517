//! [`Transport`] implementation over btleplug.
//!
//! Every request spawns a task that performs the btleplug call and reports
//! the outcome on the session's event sink. Link loss is detected from the
//! adapter's `DeviceDisconnected` events.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Peripheral as _, Service, WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::session::transport::{
    Discovery, EventSink, Transport, TransportEvent, WriteId, WriteTarget,
};

/// Find `characteristic` within `service` among discovered services.
fn lookup(
    services: &BTreeSet<Service>,
    service: Uuid,
    characteristic: Uuid,
) -> std::result::Result<Characteristic, Discovery> {
    let found = services
        .iter()
        .find(|s| s.uuid == service)
        .ok_or(Discovery::ServiceMissing(service))?;

    found
        .characteristics
        .iter()
        .find(|c| c.uuid == characteristic)
        .cloned()
        .ok_or(Discovery::CharacteristicMissing(characteristic))
}

/// Run a connect attempt and report its outcome on `events`.
///
/// A link that comes up after the session stopped listening is handed to
/// `release`, since no session owns it anymore.
async fn establish<C, R, F>(events: &EventSink, connect: C, release: R)
where
    C: Future<Output = btleplug::Result<()>>,
    R: FnOnce() -> F,
    F: Future<Output = btleplug::Result<()>>,
{
    match connect.await {
        Ok(()) if events.is_closed() => {
            debug!("Link came up after the session stopped listening, closing it");
            if let Err(e) = release().await {
                warn!("Failed to close orphaned link: {}", e);
            }
        }
        Ok(()) => {
            events.send(TransportEvent::LinkEstablished);
        }
        Err(e) => {
            warn!("Connection attempt failed: {}", e);
            events.send(TransportEvent::Failure {
                reason: e.to_string(),
            });
        }
    }
}

/// Transport for one SBrick peripheral.
pub struct BtleplugTransport {
    /// Adapter the peripheral was discovered on.
    adapter: Adapter,
    /// The peripheral to drive.
    peripheral: Peripheral,
    /// Write type used for command frames.
    write_type: WriteType,
    /// Event sink of the current link.
    sink: Arc<RwLock<Option<EventSink>>>,
    /// Resolved command characteristic.
    characteristic: Arc<RwLock<Option<Characteristic>>>,
    /// Task forwarding disconnect events.
    watcher: Mutex<Option<JoinHandle<()>>>,
    /// Incremented on every connect request.
    attempt: Arc<AtomicU64>,
}

impl BtleplugTransport {
    /// Create a transport for a discovered peripheral.
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
            write_type: WriteType::WithResponse,
            sink: Arc::new(RwLock::new(None)),
            characteristic: Arc::new(RwLock::new(None)),
            watcher: Mutex::new(None),
            attempt: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use a different write type for command frames.
    ///
    /// With `WithoutResponse`, a write completes as soon as the local stack
    /// has queued it.
    pub fn with_write_type(mut self, write_type: WriteType) -> Self {
        self.write_type = write_type;
        self
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Bluetooth address of the peripheral.
    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    fn current_sink(&self) -> Result<EventSink> {
        self.sink.read().clone().ok_or_else(|| Error::LinkError {
            reason: "no link requested".to_string(),
        })
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn connect(&self, events: EventSink) -> Result<()> {
        // Subscribe before connecting so an early disconnect is not missed.
        let mut central_events = self.adapter.events().await?;
        let id = self.peripheral.id();

        *self.sink.write() = Some(events.clone());

        let watcher_sink = events.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if watcher_sink.is_closed() {
                    break;
                }

                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == id {
                        debug!("Peripheral {:?} disconnected", disconnected);
                        watcher_sink.send(TransportEvent::LinkLost);
                        break;
                    }
                }
            }

            debug!("Disconnect watcher ended");
        });

        if let Some(previous) = self.watcher.lock().replace(watcher) {
            previous.abort();
        }

        let this_attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = self.attempt.clone();
        let peripheral = self.peripheral.clone();
        tokio::spawn(async move {
            if peripheral.is_connected().await.unwrap_or(false) {
                info!("Peripheral already connected at BLE level");
                events.send(TransportEvent::LinkEstablished);
                return;
            }

            // A newer connect request owns the link if one was made meanwhile.
            let releasing = peripheral.clone();
            let release = move || async move {
                if attempt.load(Ordering::SeqCst) == this_attempt {
                    releasing.disconnect().await
                } else {
                    Ok(())
                }
            };
            establish(&events, peripheral.connect(), release).await;
        });

        Ok(())
    }

    async fn discover_services(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        let sink = self.current_sink()?;
        let peripheral = self.peripheral.clone();
        let cache = self.characteristic.clone();

        tokio::spawn(async move {
            if let Err(e) = peripheral.discover_services().await {
                warn!("Failed to discover services: {}", e);
                sink.send(TransportEvent::Failure {
                    reason: e.to_string(),
                });
                return;
            }

            let discovery = match lookup(&peripheral.services(), service, characteristic) {
                Ok(found) => {
                    debug!(
                        "Found characteristic: {} in service {}, properties: {:?}",
                        found.uuid, found.service_uuid, found.properties
                    );
                    *cache.write() = Some(found);
                    Discovery::Resolved(WriteTarget {
                        service,
                        characteristic,
                    })
                }
                Err(missing) => missing,
            };

            sink.send(TransportEvent::ServicesDiscovered(discovery));
        });

        Ok(())
    }

    async fn write(&self, id: WriteId, target: &WriteTarget, frame: Frame) -> Result<()> {
        let sink = self.current_sink()?;
        let characteristic = self
            .characteristic
            .read()
            .clone()
            .filter(|c| c.uuid == target.characteristic)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: target.characteristic.to_string(),
            })?;

        let peripheral = self.peripheral.clone();
        let write_type = self.write_type;

        tokio::spawn(async move {
            let result = peripheral
                .write(&characteristic, frame.as_bytes(), write_type)
                .await
                .map_err(|e| e.to_string());

            trace!(
                "Wrote {} bytes to characteristic {}: {:?}",
                frame.len(),
                characteristic.uuid,
                result
            );
            sink.send(TransportEvent::WriteCompleted { id, result });
        });

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        *self.sink.write() = None;
        *self.characteristic.write() = None;

        if self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.disconnect().await?;
            info!("Successfully disconnected from {}", self.address());
        }

        Ok(())
    }
}

impl std::fmt::Debug for BtleplugTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugTransport")
            .field("address", &self.address())
            .field("write_type", &self.write_type)
            .finish()
    }
}
