//! In-memory storage implementations.

pub mod relay_store;

pub use relay_store::InMemoryRelayStore;
