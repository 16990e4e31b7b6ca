//! Per-connection ingress worker
//!
//! Turns inbound frames from one connection into [`Message`]s on the
//! dispatcher's queue. The only shared state it touches is its own
//! registry entry, which it removes when the connection ends.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Connection, Frame, FrameSource, Message, MessageKind, Registry};

/// Why an ingress worker stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressExit {
    /// The peer closed the connection
    PeerClosed,
    /// Reading from the transport failed
    ReadFailed(String),
    /// The connection was closed elsewhere (a failed broadcast write)
    Evicted,
    /// The dispatcher is gone and nothing consumes the queue
    QueueClosed,
}

/// Reads one connection and feeds the dispatcher
pub struct IngressWorker {
    connection: Arc<Connection>,
    source: Box<dyn FrameSource>,
    registry: Arc<Registry>,
    inbound_tx: mpsc::Sender<Message>,
}

impl IngressWorker {
    pub fn new(
        connection: Arc<Connection>,
        source: Box<dyn FrameSource>,
        registry: Arc<Registry>,
        inbound_tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            connection,
            source,
            registry,
            inbound_tx,
        }
    }

    /// Run the worker on its own task
    pub fn spawn(self) -> JoinHandle<IngressExit> {
        tokio::spawn(self.run())
    }

    /// Read until the connection ends, then unregister it.
    pub async fn run(mut self) -> IngressExit {
        let exit = self.pump().await;

        match &exit {
            IngressExit::PeerClosed => {
                info!("Connection closed by {}", self.connection.peer());
            }
            IngressExit::ReadFailed(reason) => {
                warn!(
                    "Unable to read message from {}: {}",
                    self.connection.peer(),
                    reason
                );
            }
            IngressExit::Evicted => {
                debug!("Connection {} closed during broadcast", self.connection.peer());
            }
            IngressExit::QueueClosed => {
                warn!(
                    "Dispatcher unavailable, dropping connection {}",
                    self.connection.peer()
                );
            }
        }

        self.registry.retire(&self.connection).await;
        exit
    }

    async fn pump(&mut self) -> IngressExit {
        loop {
            let received = tokio::select! {
                received = self.source.receive() => received,
                _ = self.connection.closed() => return IngressExit::Evicted,
            };

            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => return IngressExit::PeerClosed,
                Err(e) => return IngressExit::ReadFailed(e.to_string()),
            };

            log_received(self.connection.peer(), &frame);

            let message = Message::new(self.connection.id(), self.connection.peer(), frame);
            if self.inbound_tx.send(message).await.is_err() {
                return IngressExit::QueueClosed;
            }
        }
    }
}

fn log_received(peer: &str, frame: &Frame) {
    match frame.kind {
        MessageKind::Text => {
            debug!(
                "{} received message: {}",
                peer,
                String::from_utf8_lossy(&frame.payload)
            );
        }
        MessageKind::Binary => {
            debug!("{} received binary message ({} bytes)", peer, frame.len());
        }
    }
}
