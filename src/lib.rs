//! WebSocket broadcast relay
//!
//! - [`relay`] is the core: connection registry, per-connection ingress
//!   workers and the single fan-out dispatcher.
//! - [`server`] accepts TCP connections, performs the WebSocket upgrade and
//!   hands connections to the relay.
//! - [`config`] loads listener and relay settings.

pub mod config;
pub mod relay;
pub mod server;
