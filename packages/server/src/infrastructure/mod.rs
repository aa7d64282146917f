//! Infrastructure layer: wire DTOs, storage and transport implementations of
//! the domain traits.

pub mod dto;
pub mod message_pusher;
pub mod repository;
