//! Connection handles and the registered connection record
//!
//! A transport hands the relay two halves of a bidirectional channel: a
//! [`FrameSource`] drained by the connection's ingress worker and a
//! [`FrameSink`] written by the dispatcher. The sink lives inside a
//! [`Connection`], which is what the registry tracks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{Frame, RelayError, RelayResult};

/// Identity of a registered connection
pub type ConnectionId = Uuid;

/// How long a released sink gets to finish its close handshake
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read half of a connection handle
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next data frame.
    ///
    /// `Ok(None)` means the peer closed the connection in an orderly way.
    async fn receive(&mut self) -> RelayResult<Option<Frame>>;
}

/// Write half of a connection handle
#[async_trait]
pub trait FrameSink: Send {
    /// Write a single frame, preserving its kind.
    async fn send(&mut self, frame: &Frame) -> RelayResult<()>;

    /// Release the underlying resource. Must tolerate repeated calls.
    async fn close(&mut self);
}

/// Lifecycle of a connection once the transport has handed it over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered and assumed writable
    Registered,
    /// Removed from the registry; terminal
    Unregistered,
}

/// Result of a send attempt on a connection that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was written to the sink
    Delivered,
    /// The connection was already closed, nothing was written
    AlreadyClosed,
}

/// A connection as tracked by the registry
pub struct Connection {
    id: ConnectionId,
    peer: String,
    /// Per-connection write lock, independent of the registry lock.
    /// Emptied when the connection is closed.
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    /// `true` once the connection has been closed
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection with a fresh random identity
    pub fn new(peer: impl Into<String>, sink: Box<dyn FrameSink>) -> Self {
        Self::with_id(Uuid::new_v4(), peer, sink)
    }

    /// Create a connection with a caller-chosen identity
    pub fn with_id(id: ConnectionId, peer: impl Into<String>, sink: Box<dyn FrameSink>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id,
            peer: peer.into(),
            sink: Mutex::new(Some(sink)),
            closed_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Human-readable peer identifier (remote address)
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        if *self.closed_tx.borrow() {
            ConnectionState::Unregistered
        } else {
            ConnectionState::Registered
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Unregistered
    }

    /// Write a frame to this connection, optionally bounded by a timeout.
    ///
    /// A connection closed before the write lock is acquired is skipped.
    pub async fn send(&self, frame: &Frame, timeout: Option<Duration>) -> RelayResult<Delivery> {
        let mut guard = self.sink.lock().await;
        let sink = match guard.as_mut() {
            Some(sink) if !self.is_closed() => sink,
            _ => return Ok(Delivery::AlreadyClosed),
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, sink.send(frame))
                .await
                .map_err(|_| RelayError::SendTimeout(limit))??,
            None => sink.send(frame).await?,
        }

        Ok(Delivery::Delivered)
    }

    /// Mark the connection closed and release its sink.
    ///
    /// The sink's close handshake runs on its own task, bounded by
    /// [`CLOSE_TIMEOUT`], so a peer that stopped reading cannot hold up the
    /// caller. Only the first call does anything; returns whether this call
    /// closed it.
    pub async fn close(&self) -> bool {
        if self.closed_tx.send_replace(true) {
            return false;
        }

        let released = self.sink.lock().await.take();
        if let Some(mut sink) = released {
            let peer = self.peer.clone();
            tokio::spawn(async move {
                if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                    debug!("Close handshake with {} timed out, dropping it", peer);
                }
            });
        }
        true
    }

    /// Resolves once the connection has been closed by anyone.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
