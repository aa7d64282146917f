//! HTTP and WebSocket handlers.

pub mod http;
pub mod websocket;

pub use http::{debug_state, get_stats, health_check};
pub use websocket::websocket_handler;
