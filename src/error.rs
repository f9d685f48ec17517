//! Error types for the sbrick-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A command was encoded without any channel instruction.
    #[error("Command has no channels set")]
    EmptyCommand,

    /// The session's command queue is full and the new frame was dropped.
    #[error("Command queue full ({capacity} pending), frame dropped")]
    QueueFull {
        /// Capacity of the queue that rejected the frame.
        capacity: usize,
    },

    /// The transport reported a failure while connecting, discovering or writing.
    #[error("Link error: {reason}")]
    LinkError {
        /// Description of the failure reported by the transport.
        reason: String,
    },

    /// The device does not expose the remote control service.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// The device does not expose the remote control characteristic.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// A raw buffer is not a valid command frame.
    #[error("Invalid frame: {context}")]
    InvalidFrame {
        /// Description of what was invalid about the frame.
        context: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// No session is registered for the given address.
    #[error("Session not found: {address}")]
    SessionNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// The session task has stopped and no longer accepts requests.
    #[error("Session closed")]
    SessionClosed,

    /// Waiting for a session state timed out.
    #[error("Timed out waiting for session state")]
    Timeout,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
