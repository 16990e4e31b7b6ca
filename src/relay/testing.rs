//! In-memory transport for exercising the relay without sockets

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Frame, FrameSink, FrameSource, RelayError, RelayResult};

/// How the mock sink reacts to writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehaviour {
    Accept,
    Fail,
    /// Never completes
    Stall,
}

#[derive(Debug)]
struct PeerState {
    received: Mutex<Vec<Frame>>,
    behaviour: Mutex<SinkBehaviour>,
    send_attempts: AtomicUsize,
    close_count: AtomicUsize,
    close_stalls: AtomicBool,
}

/// The remote end of a mock connection, held by the test
#[derive(Debug, Clone)]
pub struct MockPeer {
    inbound_tx: mpsc::UnboundedSender<RelayResult<Option<Frame>>>,
    state: Arc<PeerState>,
}

pub struct MockSource {
    inbound_rx: mpsc::UnboundedReceiver<RelayResult<Option<Frame>>>,
}

pub struct MockSink {
    state: Arc<PeerState>,
}

/// Create a connected peer plus the two handle halves the relay consumes
pub fn mock_transport() -> (MockPeer, MockSource, MockSink) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let state = Arc::new(PeerState {
        received: Mutex::new(Vec::new()),
        behaviour: Mutex::new(SinkBehaviour::Accept),
        send_attempts: AtomicUsize::new(0),
        close_count: AtomicUsize::new(0),
        close_stalls: AtomicBool::new(false),
    });

    (
        MockPeer {
            inbound_tx,
            state: Arc::clone(&state),
        },
        MockSource { inbound_rx },
        MockSink { state },
    )
}

impl MockPeer {
    /// Send a frame towards the relay
    pub fn push(&self, frame: Frame) {
        let _ = self.inbound_tx.send(Ok(Some(frame)));
    }

    /// Close the connection from the peer side
    pub fn hang_up(&self) {
        let _ = self.inbound_tx.send(Ok(None));
    }

    /// Make the next read fail
    pub fn fail_read(&self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(Err(RelayError::TransportRead(reason.to_string())));
    }

    pub fn set_sink_behaviour(&self, behaviour: SinkBehaviour) {
        *self.state.behaviour.lock().unwrap() = behaviour;
    }

    /// Make the sink's close handshake never finish, like a peer that
    /// stopped reading
    pub fn stall_on_close(&self) {
        self.state.close_stalls.store(true, Ordering::SeqCst);
    }

    /// Frames the relay has written to this peer
    pub fn received(&self) -> Vec<Frame> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.state.send_attempts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames have arrived, then return them all
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Frame> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the sink has been asked to close, then return the count
    pub async fn wait_for_close(&self) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let count = self.close_count();
            if count > 0 || tokio::time::Instant::now() >= deadline {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn receive(&mut self) -> RelayResult<Option<Frame>> {
        match self.inbound_rx.recv().await {
            Some(item) => item,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: &Frame) -> RelayResult<()> {
        self.state.send_attempts.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.state.behaviour.lock().unwrap();
        match behaviour {
            SinkBehaviour::Accept => {
                self.state.received.lock().unwrap().push(frame.clone());
                Ok(())
            }
            SinkBehaviour::Fail => Err(RelayError::TransportWrite("broken pipe".to_string())),
            SinkBehaviour::Stall => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        if self.state.close_stalls.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}
