//! WebSocket transport for the assurance session client.

pub mod config;
pub mod connection;
pub mod tls;
pub mod websocket;

pub use config::*;
pub use connection::*;
pub use websocket::*;
