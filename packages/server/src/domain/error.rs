//! Domain error types.

use thiserror::Error;

/// Validation errors raised when constructing value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("client id must not be empty")]
    ClientIdEmpty,

    #[error("client id must be at most {0} characters")]
    ClientIdTooLong(usize),

    #[error("client id must not contain control characters")]
    ClientIdInvalidCharacter,
}

/// Errors raised when pushing a message to a client's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    /// No outbound channel is registered for the client
    #[error("client '{0}' is not connected")]
    ClientNotFound(String),

    /// The outbound channel exists but its socket task has already stopped
    #[error("failed to push message: {0}")]
    PushFailed(String),
}

/// Errors raised by the matchmaking store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// The client id is not bound to a live connection
    #[error("client '{0}' is not registered")]
    NotRegistered(String),
}
