//! WebSocket Broadcast Relay
//!
//! Every message a connected client sends is delivered to every connected
//! client, in the order the relay received it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ws_relay::config::RelayConfig;
use ws_relay::relay::Relay;
use ws_relay::server::WebSocketServer;

/// WebSocket broadcast relay
///
/// Relays every received message to all connected clients
#[derive(Parser, Debug)]
#[command(name = "ws-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Do not echo messages back to their sender
    #[arg(long)]
    exclude_sender: bool,

    /// Per-recipient send timeout in milliseconds
    #[arg(long)]
    send_timeout_ms: Option<u64>,

    /// Capacity of the inbound message queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Load the config file (if any) and apply command line overrides
    fn resolve_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if self.exclude_sender {
            config.relay.exclude_sender = true;
        }
        if let Some(timeout) = self.send_timeout_ms {
            config.relay.send_timeout_ms = Some(timeout);
        }
        if let Some(capacity) = self.queue_capacity {
            config.relay.queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("ws-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = args.resolve_config()?;
    if config.relay.exclude_sender {
        info!("Sender exclusion enabled");
    }

    let (relay, dispatcher) = Relay::new(config.relay.to_options());
    tokio::spawn(dispatcher.run());

    let server = Arc::new(WebSocketServer::new(config.server, relay));
    let server_handle = Arc::clone(&server);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating shutdown...");
        server_handle.shutdown();
    });

    // Failing to bind is the only fatal error
    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
