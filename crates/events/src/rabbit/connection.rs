use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::BusError;

/// Owns the single AMQP connection and reopens it when the broker drops it.
///
/// Channels are cheap and short-lived; the connection is the expensive part,
/// so everything in the crate shares one through this manager.
pub struct ConnectionManager {
    uri: String,
    connection: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            connection: Mutex::new(None),
        }
    }

    /// Whether a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        let guard = self.connection.lock().await;
        guard
            .as_ref()
            .map(|conn| conn.status().connected())
            .unwrap_or(false)
    }

    /// Connect if needed, reporting success instead of failing.
    pub async fn try_connect(&self) -> bool {
        self.ensure_connected().await.is_ok()
    }

    /// Connect if there is no live connection, reconnecting after drops.
    pub async fn ensure_connected(&self) -> Result<(), BusError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            if conn.status().connected() {
                return Ok(());
            }
            debug!("amqp connection lost, reconnecting");
            *guard = None;
        }
        match Connection::connect(&self.uri, ConnectionProperties::default()).await {
            Ok(conn) => {
                info!("amqp connection established");
                *guard = Some(conn);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "amqp connection failed");
                Err(BusError::Connect(err))
            }
        }
    }

    /// Open a fresh channel on the live connection.
    ///
    /// Fails closed with [`BusError::NotConnected`] rather than connecting
    /// implicitly; callers decide when reconnection is appropriate.
    pub async fn open_channel(&self) -> Result<Channel, BusError> {
        let guard = self.connection.lock().await;
        let conn = guard
            .as_ref()
            .filter(|conn| conn.status().connected())
            .ok_or(BusError::NotConnected)?;
        Ok(conn.create_channel().await?)
    }

    /// Close the connection if one is open.
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.take() {
            if let Err(err) = conn.close(200, "shutting down").await {
                debug!(error = %err, "amqp close failed");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}
