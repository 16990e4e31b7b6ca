//! Broadcast relay core
//!
//! Every message received from any connection is delivered to every
//! connection registered at the time it is dispatched, the sender included
//! unless [`DispatchOptions::exclude_sender`] is set.
//!
//! - [`Registry`] holds the live connections.
//! - [`IngressWorker`] (one per connection) queues inbound frames.
//! - [`Dispatcher`] (exactly one) drains the queue and fans out.

mod connection;
mod dispatcher;
mod ingress;
mod message;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use connection::*;
pub use dispatcher::*;
pub use ingress::*;
pub use message::*;
pub use registry::*;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Default inbound queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Errors raised by the relay and its transports
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Transport read failed: {0}")]
    TransportRead(String),

    #[error("Transport write failed: {0}")]
    TransportWrite(String),

    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("Connection already registered: {0}")]
    DuplicateConnection(ConnectionId),

    #[error("WebSocket upgrade failed: {0}")]
    Upgrade(String),
}

impl RelayError {
    /// Whether this error means a write to a recipient failed
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            RelayError::TransportWrite(_) | RelayError::SendTimeout(_)
        )
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Relay construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub dispatch: DispatchOptions,
    pub queue_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            dispatch: DispatchOptions::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Entry point for transports: hands new connections to the relay
///
/// Cheap to clone; all clones share one registry and one queue.
#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<Registry>,
    inbound_tx: mpsc::Sender<Message>,
}

/// A connection accepted by [`Relay::on_new_connection`]
#[derive(Debug)]
pub struct Accepted {
    pub id: ConnectionId,
    pub ingress: JoinHandle<IngressExit>,
}

impl Relay {
    /// Create a relay and the dispatcher that serves it.
    ///
    /// The caller must drive [`Dispatcher::run`] for messages to flow.
    pub fn new(options: RelayOptions) -> (Self, Dispatcher) {
        let registry = Arc::new(Registry::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), inbound_rx, options.dispatch);

        (
            Self {
                registry,
                inbound_tx,
            },
            dispatcher,
        )
    }

    /// Register a freshly upgraded connection and start its ingress worker
    pub async fn on_new_connection(
        &self,
        peer: impl Into<String>,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
    ) -> RelayResult<Accepted> {
        let connection = Arc::new(Connection::new(peer, sink));
        let id = connection.id();

        if let Err(e) = self.registry.register(Arc::clone(&connection)).await {
            connection.close().await;
            return Err(e);
        }

        info!("Connection {} registered for {}", id, connection.peer());

        let ingress = IngressWorker::new(
            connection,
            source,
            Arc::clone(&self.registry),
            self.inbound_tx.clone(),
        )
        .spawn();

        Ok(Accepted { id, ingress })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }
}
