//! Relay message types
//!
//! A [`Frame`] is what a transport hands us; a [`Message`] is a frame
//! stamped with the connection it came from.

use std::fmt;

use super::connection::ConnectionId;

/// Framing of a payload, preserved verbatim from sender to receivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text frame
    Text,
    /// Opaque binary frame
    Binary,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => f.write_str("text"),
            MessageKind::Binary => f.write_str("binary"),
        }
    }
}

/// A single data frame as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    /// Create a binary frame
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// An inbound frame tagged with its origin, queued for fan-out
///
/// Created by an ingress worker at receipt time and consumed exactly once
/// by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Connection that sent the frame
    pub origin: ConnectionId,
    /// Peer identifier of the sender (remote address)
    pub origin_peer: String,
    /// The frame itself
    pub frame: Frame,
}

impl Message {
    pub fn new(origin: ConnectionId, origin_peer: impl Into<String>, frame: Frame) -> Self {
        Self {
            origin,
            origin_peer: origin_peer.into(),
            frame,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.frame.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.frame.payload
    }
}
