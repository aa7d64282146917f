//! Domain entities: connections, search entries and sessions.

use super::{
    filter::{LocationHint, SearchCriteria},
    value_object::{ClientId, ConnectionId, SessionId, Timestamp},
};

/// Matchmaking state of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Searching,
    Paired,
}

/// Message vocabulary a client registered with.
///
/// Clients that register with `chat_register` expect `chat_matched` on
/// pairing; everyone else expects `peer_found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Video,
    Chat,
}

/// A live socket bound to a client id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConnection {
    pub client_id: ClientId,
    pub connection_id: ConnectionId,
    pub dialect: Dialect,
    pub state: ConnectionState,
    /// Criteria of the most recent `search`, reused by `next`.
    pub last_search: Option<SearchCriteria>,
    /// Whether the most recent `search` qualified for the advanced tier.
    pub advanced_tier: bool,
    pub connected_at: Timestamp,
}

impl ClientConnection {
    pub fn new(
        client_id: ClientId,
        connection_id: ConnectionId,
        dialect: Dialect,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            client_id,
            connection_id,
            dialect,
            state: ConnectionState::Idle,
            last_search: None,
            advanced_tier: false,
            connected_at,
        }
    }

    /// Last known location hint.
    pub fn location(&self) -> Option<&LocationHint> {
        self.last_search.as_ref().and_then(|c| c.location.as_ref())
    }
}

/// A client waiting in the search queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEntry {
    pub client_id: ClientId,
    /// Socket that issued the search; the entry is void once it is replaced
    pub connection_id: ConnectionId,
    pub criteria: SearchCriteria,
    pub advanced_tier: bool,
    pub enqueued_at: Timestamp,
}

/// Session state. `ActiveCall` is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Paired,
    ActiveCall,
    Ended,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The other peer sent `end_call`
    EndCall,
    /// The other peer sent `disconnect`
    Disconnect,
    /// The other peer asked for another partner
    Next,
    /// The other peer started a new search while paired
    Search,
    /// The other peer's socket closed
    SocketClosed,
    /// The other peer reconnected on a new socket
    Replaced,
    /// The other peer could not be reached when the session was announced
    PeerUnavailable,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::EndCall => "end_call",
            EndReason::Disconnect => "disconnect",
            EndReason::Next => "next",
            EndReason::Search => "search",
            EndReason::SocketClosed => "socket_closed",
            EndReason::Replaced => "replaced",
            EndReason::PeerUnavailable => "peer_unavailable",
        }
    }
}

/// A pairing of exactly two clients.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub peer_a: ClientId,
    pub peer_b: ClientId,
    pub state: SessionState,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl Session {
    pub fn new(peer_a: ClientId, peer_b: ClientId, created_at: Timestamp) -> Self {
        Self {
            id: SessionId::generate(),
            peer_a,
            peer_b,
            state: SessionState::Paired,
            created_at,
            ended_at: None,
        }
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        &self.peer_a == client_id || &self.peer_b == client_id
    }

    /// The other peer, or `None` if `client_id` is not part of this session.
    pub fn peer_of(&self, client_id: &ClientId) -> Option<&ClientId> {
        if &self.peer_a == client_id {
            Some(&self.peer_b)
        } else if &self.peer_b == client_id {
            Some(&self.peer_a)
        } else {
            None
        }
    }

    /// The lexicographically smaller id sends the first offer.
    pub fn initiator(&self) -> &ClientId {
        std::cmp::min(&self.peer_a, &self.peer_b)
    }

    pub fn end(&mut self, ended_at: Timestamp) {
        self.state = SessionState::Ended;
        self.ended_at = Some(ended_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> ClientId {
        ClientId::new(value.to_string()).unwrap()
    }

    #[test]
    fn test_initiator_is_lexicographically_smaller_peer() {
        // テスト項目: 辞書順で小さい方の ClientId が発信側になる（順序に依存しない）
        // given (前提条件):
        let ab = Session::new(id("0xAAA"), id("0xBBB"), Timestamp::new(0));
        let ba = Session::new(id("0xBBB"), id("0xAAA"), Timestamp::new(0));

        // when (操作):
        let initiator_ab = ab.initiator().clone();
        let initiator_ba = ba.initiator().clone();

        // then (期待する結果):
        assert_eq!(initiator_ab, id("0xAAA"));
        assert_eq!(initiator_ba, id("0xAAA"));
    }

    #[test]
    fn test_peer_of_is_symmetric() {
        // テスト項目: peer_of がどちらの側からも相手を返し、第三者には None を返す
        // given (前提条件):
        let session = Session::new(id("alice"), id("bob"), Timestamp::new(0));

        // when (操作) / then (期待する結果):
        assert_eq!(session.peer_of(&id("alice")), Some(&id("bob")));
        assert_eq!(session.peer_of(&id("bob")), Some(&id("alice")));
        assert_eq!(session.peer_of(&id("charlie")), None);
    }

    #[test]
    fn test_end_marks_session_ended() {
        // テスト項目: end で状態が Ended になり終了時刻が記録される
        // given (前提条件):
        let mut session = Session::new(id("alice"), id("bob"), Timestamp::new(1000));

        // when (操作):
        session.end(Timestamp::new(2000));

        // then (期待する結果):
        assert_eq!(session.state, SessionState::Ended);
        assert_eq!(session.ended_at, Some(Timestamp::new(2000)));
    }
}
