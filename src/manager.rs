//! Registry of SBrick sessions keyed by device address.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::session::{Session, Transport};

/// Central manager for SBrick sessions.
pub struct SessionManager {
    /// Configuration applied to every new session.
    config: SessionConfig,
    /// Sessions by device address.
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    /// Create a new SessionManager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `config` does not validate.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Configuration applied to new sessions.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session to `address` and ask it to connect.
    ///
    /// An existing session for `address` is reused and `transport` is
    /// dropped.
    pub async fn connect(
        &self,
        address: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Session>> {
        let existing = self.sessions.read().get(address).cloned();

        let session = match existing {
            Some(session) => {
                debug!("Reusing session for {}", address);
                session
            }
            None => {
                let session = Arc::new(Session::new(address, transport, &self.config)?);
                self.sessions
                    .write()
                    .entry(address.to_string())
                    .or_insert(session)
                    .clone()
            }
        };

        info!("Connecting to SBrick {}", address);
        session.connect().await?;

        Ok(session)
    }

    /// Close the session to `address` and forget it.
    pub async fn disconnect(&self, address: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(address)
            .ok_or_else(|| Error::SessionNotFound {
                address: address.to_string(),
            })?;

        info!("Disconnecting from SBrick {}", address);
        session.disconnect().await
    }

    /// Get the session for `address`.
    pub fn get(&self, address: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(address).cloned()
    }

    /// Get all sessions.
    pub fn sessions(&self) -> HashMap<String, Arc<Session>> {
        self.sessions.read().clone()
    }

    /// Get the number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Queue `command` on the session for `address`.
    pub fn submit(&self, address: &str, command: &Command) -> Result<()> {
        let session = self.get(address).ok_or_else(|| Error::SessionNotFound {
            address: address.to_string(),
        })?;

        session.submit(command)
    }

    /// Disconnect every session.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down session manager");

        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            if let Err(e) = session.disconnect().await {
                warn!("Error disconnecting {}: {}", session.address(), e);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("sessions", &self.session_count())
            .finish()
    }
}
