//! Domain layer: entities, value objects, pure matchmaking rules and the
//! interfaces the relay needs from storage and transport.

pub mod entity;
pub mod error;
pub mod filter;
pub mod matching;
pub mod notification;
pub mod presence;
pub mod pusher;
pub mod repository;
pub mod value_object;

pub use entity::{
    ClientConnection, ConnectionState, Dialect, EndReason, SearchEntry, Session, SessionState,
};
pub use error::{MatchError, MessagePushError, ValueObjectError};
pub use filter::{AgeRange, LocationHint, SearchCriteria, SearchFilters, SelfProfile};
pub use notification::{DisclosedLocation, ErrorCode, Notification};
pub use presence::{PresenceSnapshot, PresenceTally};
pub use pusher::{MessagePusher, PusherChannel};
pub use repository::{
    ConnectionRepository, MatchRepository, PairedSession, RegisterOutcome, RelayStats,
    SearchOutcome, SearchResult, UnregisterOutcome,
};
pub use value_object::{ClientId, ConnectionId, SessionId, Timestamp};

#[cfg(test)]
pub use pusher::MockMessagePusher;
