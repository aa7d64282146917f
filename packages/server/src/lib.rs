//! Deai relay server: stranger matchmaking and WebRTC signaling over WebSocket.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
