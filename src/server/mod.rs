//! WebSocket server module
//!
//! The transport side of the relay: accepts connections, upgrades them to
//! WebSocket and adapts them to the relay's connection handles.

mod transport;
mod websocket;

pub use transport::{upgrade, WsSink, WsSource, WS_PATH};
pub use websocket::WebSocketServer;
