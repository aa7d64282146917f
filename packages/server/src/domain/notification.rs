//! Server-originated events delivered to clients.
//!
//! These are protocol-independent; the infrastructure layer decides the wire
//! vocabulary (see `infrastructure::dto::conversion`).

use super::{
    entity::{Dialect, EndReason},
    filter::LocationHint,
    presence::PresenceSnapshot,
    value_object::{ClientId, SessionId},
};

/// Peer location as disclosed to the other side of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisclosedLocation {
    pub country: Option<String>,
    pub city: Option<String>,
}

impl DisclosedLocation {
    /// Advanced-tier recipients see country and city; basic ones see the
    /// country only. Coordinates are never disclosed.
    pub fn for_recipient(location: Option<&LocationHint>, advanced_recipient: bool) -> Option<Self> {
        let location = location?;
        let disclosed = Self {
            country: location.country.clone(),
            city: if advanced_recipient {
                location.city.clone()
            } else {
                None
            },
        };
        if disclosed.country.is_none() && disclosed.city.is_none() {
            None
        } else {
            Some(disclosed)
        }
    }
}

/// Error codes reported to the offending sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedJson,
    InvalidMessage,
    InvalidClientId,
    NotRegistered,
    Replaced,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedJson => "malformed_json",
            ErrorCode::InvalidMessage => "invalid_message",
            ErrorCode::InvalidClientId => "invalid_client_id",
            ErrorCode::NotRegistered => "not_registered",
            ErrorCode::Replaced => "replaced",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The connection is now bound to `client_id`
    Registered { client_id: ClientId },
    /// A session was created
    PeerFound {
        dialect: Dialect,
        session_id: SessionId,
        peer_id: ClientId,
        is_initiator: bool,
        peer_location: Option<DisclosedLocation>,
    },
    /// The session with the recipient's peer is over
    SessionEnded {
        session_id: SessionId,
        reason: EndReason,
    },
    OnlineCount { count: usize },
    OnlineByCountry(PresenceSnapshot),
    Error { code: ErrorCode, message: String },
}

impl Notification {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
