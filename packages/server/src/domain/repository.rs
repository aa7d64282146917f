//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! The connection registry, the search queue and the session table are
//! separate traits, but an implementation must make the multi-table steps
//! (unregister with cleanup, pairing) indivisible.

use async_trait::async_trait;

use super::{
    entity::{ClientConnection, SearchEntry, Session},
    error::MatchError,
    presence::PresenceSnapshot,
    value_object::{ClientId, ConnectionId, SessionId},
};

/// Result of binding a client id to a new connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    /// The previous connection of the same client id, if any
    pub replaced: Option<ClientConnection>,
    /// Session of the previous connection, torn down by the replacement
    pub ended_session: Option<Session>,
}

/// Result of removing a connection from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct UnregisterOutcome {
    pub connection: ClientConnection,
    pub ended_session: Option<Session>,
}

/// Both sides of a freshly created session.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedSession {
    pub session: Session,
    /// Entry of the peer that was already waiting
    pub waiting: SearchEntry,
    /// Entry of the peer whose search triggered the pairing
    pub entrant: SearchEntry,
}

/// Result of a `search` (or re-queue).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Session the searcher was in before; it is ended by the search
    pub ended_session: Option<Session>,
    /// The search moved the client to another country bucket
    pub relocated: bool,
    pub result: SearchResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    /// No compatible peer yet; the entry waits at `position` (0 = front)
    Queued { position: usize },
    Paired(PairedSession),
}

/// Counters for the HTTP stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub presence: PresenceSnapshot,
    pub searching: usize,
    pub active_sessions: usize,
}

/// ConnectionRegistry: live connections keyed by client id.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Bind the connection's client id, atomically replacing a prior binding.
    ///
    /// Registering again from the connection that already holds the id only
    /// refreshes its dialect.
    async fn register(&self, connection: ClientConnection) -> RegisterOutcome;

    /// Remove the binding if it still belongs to `connection_id`, together with
    /// any search entry and session of the client. Idempotent.
    async fn unregister(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Option<UnregisterOutcome>;

    async fn get(&self, client_id: &ClientId) -> Option<ClientConnection>;

    /// Whether `client_id` is currently bound to `connection_id`.
    async fn is_current(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool;

    /// Ids of all connections matching `predicate`.
    async fn client_ids_where(
        &self,
        predicate: &(dyn for<'a> Fn(&'a ClientConnection) -> bool + Send + Sync),
    ) -> Vec<ClientId>;

    async fn presence(&self) -> PresenceSnapshot;
}

/// Matchmaker queue and session table.
///
/// Operations that act on behalf of a client take the `ConnectionId` of the
/// socket asking; they do nothing unless that socket still holds the id.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Tear down the searcher's session (if any), drop its previous entry and
    /// pair it with the earliest compatible waiting entry, or queue it in
    /// enqueue-time order.
    async fn enqueue(&self, entry: SearchEntry) -> Result<SearchOutcome, MatchError>;

    /// Remove the client's search entry. Returns `false` if there was none.
    async fn stop_search(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool;

    /// Peer of the client's active session. With `mark_active_call`, a
    /// `Paired` session advances to `ActiveCall`.
    async fn peer_of(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
        mark_active_call: bool,
    ) -> Option<ClientId>;

    /// Remove the client's session and return its peers to idle.
    ///
    /// Exactly one caller observes `Some` for a given session.
    async fn end_session(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Option<Session>;

    /// Like `end_session`, but only if `session_id` is still live.
    async fn end_session_by_id(&self, session_id: &SessionId) -> Option<Session>;

    async fn is_session_live(&self, session_id: &SessionId) -> bool;

    async fn sessions(&self) -> Vec<Session>;

    async fn stats(&self) -> RelayStats;
}
