//! Utilities shared by the Deai binaries and libraries.

pub mod logger;
pub mod time;
