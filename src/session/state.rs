//! Session lifecycle states and state change events.

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::Error;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionState {
    /// No link to the device.
    #[default]
    Disconnected,
    /// Waiting for the transport to open a link.
    Connecting,
    /// Link is up, looking up the remote control characteristic.
    ServicesDiscovering,
    /// Write target resolved; keepalive transmissions are running.
    Ready,
    /// A failure is being cleaned up. Always followed by `Disconnected`.
    Error,
}

impl SessionState {
    /// Check if frames may be transmitted.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a link is being set up.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::ServicesDiscovering)
    }

    /// Check if the session holds (or is acquiring) a link.
    pub fn is_active(&self) -> bool {
        self.is_transitioning() || self.is_ready()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::ServicesDiscovering => write!(f, "ServicesDiscovering"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Why a session fell back to `Disconnected`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The link dropped.
    #[error("Connection lost")]
    LinkLost,

    /// The transport reported a non-success status.
    #[error("Link error: {reason}")]
    Link {
        /// Description reported by the transport.
        reason: String,
    },

    /// The device has no remote control service.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The missing service.
        uuid: Uuid,
    },

    /// The remote control service has no command characteristic.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The missing characteristic.
        uuid: Uuid,
    },
}

impl Failure {
    pub(crate) fn link(reason: impl std::fmt::Display) -> Self {
        Self::Link {
            reason: reason.to_string(),
        }
    }

    /// Check if retrying the same device cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound { .. } | Self::CharacteristicNotFound { .. }
        )
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::LinkLost => Error::LinkError {
                reason: "Connection lost".to_string(),
            },
            Failure::Link { reason } => Error::LinkError { reason },
            Failure::ServiceNotFound { uuid } => Error::ServiceNotFound {
                uuid: uuid.to_string(),
            },
            Failure::CharacteristicNotFound { uuid } => Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            },
        }
    }
}

/// Event for session state changes.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Address of the device.
    pub address: String,
    /// State before the change.
    pub previous: SessionState,
    /// The new state.
    pub state: SessionState,
    /// Cause, when the change was forced by a failure.
    pub failure: Option<Failure>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}
