//! Single-writer fan-out dispatcher
//!
//! Drains the inbound queue in FIFO order and writes each message to every
//! registry member, one member at a time. Because there is exactly one
//! consumer and sends are sequential, every recipient observes messages in
//! the same global order.
//!
//! A recipient whose `send` never returns stalls the whole loop unless a
//! send timeout is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Delivery, Message, Registry};

/// Fan-out behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Skip the originating connection (chat-style semantics)
    pub exclude_sender: bool,
    /// Upper bound for a single recipient write; `None` waits forever
    pub send_timeout: Option<Duration>,
}

/// Outcome of broadcasting one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Recipients the frame was written to
    pub delivered: usize,
    /// Recipients whose write failed; these were unregistered
    pub failed: usize,
    /// Recipients skipped (the sender, or already closed)
    pub skipped: usize,
}

/// The relay's single serialization point
pub struct Dispatcher {
    registry: Arc<Registry>,
    inbound_rx: mpsc::Receiver<Message>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        inbound_rx: mpsc::Receiver<Message>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry,
            inbound_rx,
            options,
        }
    }

    /// Main loop. Returns only once every queue sender has been dropped.
    pub async fn run(mut self) {
        info!(
            "Dispatcher started (exclude_sender={}, send_timeout={:?})",
            self.options.exclude_sender, self.options.send_timeout
        );

        while let Some(message) = self.inbound_rx.recv().await {
            let report = self.fan_out(&message).await;
            debug!(
                "Broadcast {} message from {}: delivered={} failed={} skipped={}",
                message.kind(),
                message.origin_peer,
                report.delivered,
                report.failed,
                report.skipped
            );
        }

        info!("Inbound queue closed, dispatcher stopping");
    }

    /// Write one message to every current registry member.
    ///
    /// A failing recipient is unregistered and closed; the rest still
    /// receive the message. Failed writes are never retried.
    pub async fn fan_out(&self, message: &Message) -> FanOutReport {
        let mut report = FanOutReport::default();

        for member in self.registry.snapshot().await {
            if self.options.exclude_sender && member.id() == message.origin {
                report.skipped += 1;
                continue;
            }

            match member.send(&message.frame, self.options.send_timeout).await {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::AlreadyClosed) => report.skipped += 1,
                Err(e) => {
                    warn!("Unable to send a message to {}: {}", member.peer(), e);
                    self.registry.retire(&member).await;
                    report.failed += 1;
                }
            }
        }

        report
    }
}
