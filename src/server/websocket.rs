//! WebSocket server implementation
//!
//! Accepts TCP connections, upgrades them to WebSocket and hands each one
//! to the relay.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{error, info};

use super::transport::{upgrade, WS_PATH};
use crate::config::ServerConfig;
use crate::relay::{Relay, RelayResult};

/// WebSocket server feeding a [`Relay`]
pub struct WebSocketServer {
    config: ServerConfig,
    relay: Relay,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(config: ServerConfig, relay: Relay) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            relay,
            shutdown_tx,
        }
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Stops accepting when a shutdown signal is received; connections
    /// already handed to the relay are left to it.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Running WebSocket relay on ws://{}{}", local_addr, WS_PATH);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let relay = self.relay.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, relay).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        info!(
            "Stopped accepting connections ({} still connected)",
            self.relay.connection_count().await
        );
        Ok(())
    }
}

/// Upgrade a single connection and register it with the relay
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Relay,
) -> RelayResult<()> {
    info!("New connection from {}", peer_addr);

    let (source, sink) = upgrade(stream).await?;
    relay
        .on_new_connection(peer_addr.to_string(), Box::new(source), Box::new(sink))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{DispatchOptions, RelayOptions};
    use futures_util::{SinkExt, Stream, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start_server(options: RelayOptions) -> (Arc<WebSocketServer>, Relay, SocketAddr) {
        let (relay, dispatcher) = Relay::new(options);
        tokio::spawn(dispatcher.run());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(WebSocketServer::new(
            ServerConfig::new("127.0.0.1", addr.port()),
            relay.clone(),
        ));

        let serving = Arc::clone(&server);
        tokio::spawn(async move { serving.serve(listener).await });

        (server, relay, addr)
    }

    async fn wait_for_connections(relay: &Relay, count: usize) {
        for _ in 0..200 {
            if relay.connection_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} connections", count);
    }

    async fn next_data<S>(ws: &mut S) -> Message
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error")
    }

    #[tokio::test]
    async fn test_broadcast_over_websocket() {
        let (_server, relay, addr) = start_server(RelayOptions::default()).await;
        let url = format!("ws://{}{}", addr, WS_PATH);

        let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
        let (mut bob, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&relay, 2).await;

        alice.send(Message::Text("hello".to_string())).await.unwrap();

        assert_eq!(next_data(&mut bob).await, Message::Text("hello".to_string()));
        assert_eq!(next_data(&mut alice).await, Message::Text("hello".to_string()));

        bob.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(next_data(&mut alice).await, Message::Binary(vec![1, 2, 3]));
        assert_eq!(next_data(&mut bob).await, Message::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_client_close_unregisters() {
        let (_server, relay, addr) = start_server(RelayOptions::default()).await;
        let url = format!("ws://{}{}", addr, WS_PATH);

        let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&relay, 1).await;

        alice.close(None).await.unwrap();
        wait_for_connections(&relay, 0).await;
    }

    #[tokio::test]
    async fn test_stalled_reader_is_evicted_without_blocking_others() {
        const FRAMES: usize = 32;

        let (_server, relay, addr) = start_server(RelayOptions {
            dispatch: DispatchOptions {
                exclude_sender: true,
                send_timeout: Some(Duration::from_millis(200)),
            },
            ..Default::default()
        })
        .await;
        let url = format!("ws://{}{}", addr, WS_PATH);

        // Connected but never reads, so its socket buffers fill up.
        let (_stalled, _) = connect_async(url.as_str()).await.unwrap();
        let (healthy, _) = connect_async(url.as_str()).await.unwrap();
        let (mut sender, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&relay, 3).await;

        let reader = tokio::spawn(async move {
            let (_write, mut read) = healthy.split();
            let mut count = 0;
            while count < FRAMES {
                match read.next().await {
                    Some(Ok(Message::Binary(payload))) => {
                        assert_eq!(payload.len(), 1 << 20);
                        count += 1;
                    }
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            count
        });

        for _ in 0..FRAMES {
            sender.send(Message::Binary(vec![0u8; 1 << 20])).await.unwrap();
        }

        let received = tokio::time::timeout(Duration::from_secs(20), reader)
            .await
            .expect("healthy reader starved by a stalled peer")
            .unwrap();
        assert_eq!(received, FRAMES);
        wait_for_connections(&relay, 2).await;
    }

    #[tokio::test]
    async fn test_rejects_other_paths() {
        let (_server, relay, addr) = start_server(RelayOptions::default()).await;

        let result = connect_async(format!("ws://{}/chat", addr)).await;
        assert!(result.is_err());
        assert_eq!(relay.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (relay, _dispatcher) = Relay::new(RelayOptions::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(WebSocketServer::new(ServerConfig::default(), relay));

        let serving = Arc::clone(&server);
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        // A signal sent before the accept loop subscribes is lost, so repeat it.
        for _ in 0..100 {
            server.shutdown();
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
