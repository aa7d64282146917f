//! Value objects used throughout the relay domain.

use std::fmt;

use uuid::Uuid;

use super::error::ValueObjectError;

/// Maximum length of a client identifier (wallet address or session id).
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Opaque client identifier: a wallet address or a generated session id.
///
/// Ordering is plain lexicographic byte order on the trimmed string, which is
/// what decides the call initiator of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValueObjectError::ClientIdEmpty);
        }
        if trimmed.chars().count() > MAX_CLIENT_ID_LEN {
            return Err(ValueObjectError::ClientIdTooLong(MAX_CLIENT_ID_LEN));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ValueObjectError::ClientIdInvalidCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate an anonymous id for clients that register without a wallet.
    pub fn generate_anonymous() -> Self {
        Self(format!("anon-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generation id of one physical socket.
///
/// A client id can be re-bound to a new socket; cleanup coming from the old
/// socket carries the old `ConnectionId` and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id derived from `seed`.
    #[cfg(test)]
    pub(crate) fn fixed(seed: &str) -> Self {
        let value = seed
            .bytes()
            .fold(0u128, |acc, b| acc.wrapping_mul(31).wrapping_add(u128::from(b)));
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique id of one pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in milliseconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}
