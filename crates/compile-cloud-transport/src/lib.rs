//! Connection transports for compile cloud sessions.
//!
//! Provides:
//! - WebSocket client transport (feature: websocket)
//! - In-process channel transport with a scriptable backend side

pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{BackendPeer, MemoryBackend, MemoryTransport};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
