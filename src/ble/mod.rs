//! BLE communication module.
//!
//! This module provides the btleplug-backed transport and the GATT
//! identifiers of the SBrick remote control service.

pub mod transport;
pub mod uuids;

pub use transport::BtleplugTransport;
pub use uuids::*;
