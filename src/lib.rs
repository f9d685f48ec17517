// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # sbrick-rust-ble
//!
//! A cross-platform Rust library for driving Vengit SBrick 4-channel
//! actuator controllers over Bluetooth Low Energy.
//!
//! The SBrick stops its outputs when it has not received a command for a
//! short while. A [`Session`] therefore keeps retransmitting the most recent
//! command on a fixed keepalive period for as long as the link is up.
//!
//! ## Features
//!
//! - **Command Encoding**: Build STOP and DRIVE commands for channels A-D
//! - **Latest-wins Queue**: Only the most recent submission is transmitted
//! - **Keepalive**: Periodic retransmission below the device watchdog timeout
//! - **Connection State Machine**: Observable state changes with failure causes
//! - **Multi-device Support**: Manage several SBricks by address
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use btleplug::api::{Central, Manager as _};
//! use btleplug::platform::Manager;
//! use sbrick_rust_ble::{
//!     BtleplugTransport, Channel, Command, Direction, SessionConfig, SessionManager,
//!     SessionState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Manager::new().await?.adapters().await?.remove(0);
//!     let peripheral = adapter.peripherals().await?.remove(0);
//!     let transport = BtleplugTransport::new(adapter, peripheral);
//!     let address = transport.address();
//!
//!     let manager = SessionManager::new(SessionConfig::default())?;
//!     let session = manager.connect(&address, Arc::new(transport)).await?;
//!     session
//!         .wait_for_state(SessionState::Ready, Duration::from_secs(10))
//!         .await?;
//!
//!     // Drive channel A at full power for two seconds.
//!     session.submit(
//!         &Command::drive()
//!             .channel(Channel::A, Direction::Clockwise, 0xFF)
//!             .build(),
//!     )?;
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     session.submit(&Command::stop_all())?;
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for commands, states and configuration

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod queue;
pub mod session;

// Re-exports for convenience
pub use ble::uuids::{REMOTE_CONTROL_COMMANDS_UUID, REMOTE_CONTROL_SERVICE_UUID, SBRICK_LOCAL_NAME};
pub use ble::BtleplugTransport;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use manager::SessionManager;
pub use protocol::{
    encode, Channel, ChannelInstruction, Command, CommandKind, Direction, DriveBuilder, Frame,
    StopBuilder,
};
pub use queue::CommandQueue;
pub use session::{
    CallbackHandle, Discovery, EventSink, Failure, Session, SessionState, StateChange, Transport,
    TransportEvent, WriteId, WriteTarget,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<SessionManager>();
        let _ = std::any::TypeId::of::<Session>();
        let _ = std::any::TypeId::of::<BtleplugTransport>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Command>();
        let _ = std::any::TypeId::of::<Frame>();
        let _ = std::any::TypeId::of::<CommandQueue>();
        let _ = std::any::TypeId::of::<SessionState>();
    }

    #[test]
    fn test_stop_all_frame() {
        let frame = encode(&Command::stop_all()).unwrap();
        assert_eq!(frame.to_string(), "00 00 01 02 03");
    }
}
