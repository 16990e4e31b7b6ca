//! Connection registry
//!
//! The authoritative set of connections currently eligible for broadcast.
//! Each operation takes the lock once and never holds it across I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{Connection, ConnectionId, RelayError, RelayResult};

/// Live set of connections accepting broadcasts
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Fails if its identity is already present.
    pub async fn register(&self, connection: Arc<Connection>) -> RelayResult<()> {
        let mut connections = self.connections.write().await;
        let id = connection.id();
        if connections.contains_key(&id) {
            return Err(RelayError::DuplicateConnection(id));
        }
        connections.insert(id, connection);
        debug!("Registered connection {} ({} live)", id, connections.len());
        Ok(())
    }

    /// Remove a connection if present. Removing an absent id is not an error.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!("Unregistered connection {} ({} live)", id, connections.len());
        }
        removed
    }

    /// Unregister a connection and release its resource.
    ///
    /// Returns whether the connection was still registered.
    pub async fn retire(&self, connection: &Connection) -> bool {
        let removed = self.unregister(connection.id()).await.is_some();
        connection.close().await;
        removed
    }

    /// Current members, in no particular order.
    ///
    /// Members may be closed by the time the caller writes to them.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
