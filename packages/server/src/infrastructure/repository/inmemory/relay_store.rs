//! InMemory relay store 実装
//!
//! ドメイン層が定義する `ConnectionRepository` と `MatchRepository` の両方を
//! 1 つの構造体で実装します。接続レジストリ・検索キュー・セッション表を
//! 1 つの Mutex で保護することで、「キューから取り出してセッション表に入れる」
//! といった複数テーブルにまたがる操作を不可分にしています。
//!
//! ロックを保持している間は I/O を行いません（通知は呼び出し側が行う）。

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use deai_shared::time::Clock;
use tokio::sync::Mutex;

use crate::domain::{
    ClientConnection, ClientId, ConnectionId, ConnectionRepository, ConnectionState, MatchError,
    MatchRepository, PairedSession, PresenceSnapshot, PresenceTally, RegisterOutcome, RelayStats,
    SearchEntry, SearchOutcome, SearchResult, Session, SessionId, SessionState, Timestamp,
    UnregisterOutcome,
    matching::{find_earliest_compatible, insertion_index},
};

#[derive(Default)]
struct RelayTables {
    connections: HashMap<ClientId, ClientConnection>,
    /// Ordered by enqueue time, front = longest waiting
    queue: VecDeque<SearchEntry>,
    sessions: HashMap<SessionId, Session>,
    /// client id -> id of the session it is in
    session_index: HashMap<ClientId, SessionId>,
    presence: PresenceTally,
}

impl RelayTables {
    fn owns(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        self.connections
            .get(client_id)
            .is_some_and(|c| c.connection_id == connection_id)
    }

    fn remove_search(&mut self, client_id: &ClientId) -> bool {
        match self.queue.iter().position(|e| &e.client_id == client_id) {
            Some(index) => self.queue.remove(index).is_some(),
            None => false,
        }
    }

    fn take_session(&mut self, client_id: &ClientId, now: Timestamp) -> Option<Session> {
        let session_id = self.session_index.remove(client_id)?;
        let mut session = self.sessions.remove(&session_id)?;
        if let Some(peer) = session.peer_of(client_id).cloned() {
            self.session_index.remove(&peer);
            self.set_state(&peer, ConnectionState::Idle);
        }
        self.set_state(client_id, ConnectionState::Idle);
        session.end(now);
        Some(session)
    }

    fn set_state(&mut self, client_id: &ClientId, state: ConnectionState) {
        if let Some(connection) = self.connections.get_mut(client_id) {
            connection.state = state;
        }
    }
}

fn country_of(connection: &ClientConnection) -> Option<String> {
    connection.location().and_then(|l| l.country_key())
}

/// インメモリの接続レジストリ兼マッチメイキングストア
pub struct InMemoryRelayStore {
    tables: Mutex<RelayTables>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRelayStore {
    /// 新しい InMemoryRelayStore を作成
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(RelayTables::default()),
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryRelayStore {
    async fn register(&self, connection: ClientConnection) -> RegisterOutcome {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let client_id = connection.client_id.clone();

        if let Some(current) = tables.connections.get_mut(&client_id)
            && current.connection_id == connection.connection_id
        {
            current.dialect = connection.dialect;
            return RegisterOutcome {
                replaced: None,
                ended_session: None,
            };
        }

        let replaced = tables.connections.remove(&client_id);
        let mut ended_session = None;
        if let Some(old) = &replaced {
            tables.remove_search(&client_id);
            ended_session = tables.take_session(&client_id, now);
            tables.presence.leave(country_of(old).as_deref());
        }

        tables.presence.join(country_of(&connection).as_deref());
        tables.connections.insert(client_id, connection);

        RegisterOutcome {
            replaced,
            ended_session,
        }
    }

    async fn unregister(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Option<UnregisterOutcome> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        if !tables.owns(client_id, connection_id) {
            return None;
        }

        let connection = tables.connections.remove(client_id)?;
        tables.remove_search(client_id);
        let ended_session = tables.take_session(client_id, now);
        tables.presence.leave(country_of(&connection).as_deref());

        Some(UnregisterOutcome {
            connection,
            ended_session,
        })
    }

    async fn get(&self, client_id: &ClientId) -> Option<ClientConnection> {
        let tables = self.tables.lock().await;
        tables.connections.get(client_id).cloned()
    }

    async fn is_current(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let tables = self.tables.lock().await;
        tables.owns(client_id, connection_id)
    }

    async fn client_ids_where(
        &self,
        predicate: &(dyn for<'a> Fn(&'a ClientConnection) -> bool + Send + Sync),
    ) -> Vec<ClientId> {
        let tables = self.tables.lock().await;
        tables
            .connections
            .values()
            .filter(|c| predicate(c))
            .map(|c| c.client_id.clone())
            .collect()
    }

    async fn presence(&self) -> PresenceSnapshot {
        let tables = self.tables.lock().await;
        tables.presence.snapshot()
    }
}

#[async_trait]
impl MatchRepository for InMemoryRelayStore {
    async fn enqueue(&self, mut entry: SearchEntry) -> Result<SearchOutcome, MatchError> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let client_id = entry.client_id.clone();

        let (old_country, last_location) = match tables.connections.get(&client_id) {
            Some(connection) if connection.connection_id == entry.connection_id => {
                (country_of(connection), connection.location().cloned())
            }
            _ => return Err(MatchError::NotRegistered(client_id.into_string())),
        };

        // A client cannot search while paired.
        let ended_session = tables.take_session(&client_id, now);
        tables.remove_search(&client_id);

        if entry.criteria.location.is_none() {
            entry.criteria.location = last_location;
        }
        let new_country = entry
            .criteria
            .location
            .as_ref()
            .and_then(|l| l.country_key());
        let relocated = tables
            .presence
            .relocate(old_country.as_deref(), new_country.as_deref());
        if let Some(connection) = tables.connections.get_mut(&client_id) {
            connection.last_search = Some(entry.criteria.clone());
            connection.advanced_tier = entry.advanced_tier;
        }

        let matched = find_earliest_compatible(&tables.queue, &entry)
            .and_then(|index| tables.queue.remove(index));

        let result = match matched {
            Some(waiting) => {
                let session = Session::new(waiting.client_id.clone(), client_id.clone(), now);
                tables
                    .session_index
                    .insert(waiting.client_id.clone(), session.id.clone());
                tables
                    .session_index
                    .insert(client_id.clone(), session.id.clone());
                tables.sessions.insert(session.id.clone(), session.clone());
                tables.set_state(&waiting.client_id, ConnectionState::Paired);
                tables.set_state(&client_id, ConnectionState::Paired);

                SearchResult::Paired(PairedSession {
                    session,
                    waiting,
                    entrant: entry,
                })
            }
            None => {
                let position = insertion_index(&tables.queue, &entry);
                tables.queue.insert(position, entry);
                tables.set_state(&client_id, ConnectionState::Searching);
                SearchResult::Queued { position }
            }
        };

        Ok(SearchOutcome {
            ended_session,
            relocated,
            result,
        })
    }

    async fn stop_search(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let mut tables = self.tables.lock().await;
        if !tables.owns(client_id, connection_id) {
            return false;
        }
        let removed = tables.remove_search(client_id);
        if removed {
            tables.set_state(client_id, ConnectionState::Idle);
        }
        removed
    }

    async fn peer_of(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
        mark_active_call: bool,
    ) -> Option<ClientId> {
        let mut tables = self.tables.lock().await;
        if !tables.owns(client_id, connection_id) {
            return None;
        }
        let session_id = tables.session_index.get(client_id)?.clone();
        let session = tables.sessions.get_mut(&session_id)?;
        if mark_active_call && session.state == SessionState::Paired {
            session.state = SessionState::ActiveCall;
        }
        session.peer_of(client_id).cloned()
    }

    async fn end_session(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Option<Session> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        if !tables.owns(client_id, connection_id) {
            return None;
        }
        tables.take_session(client_id, now)
    }

    async fn end_session_by_id(&self, session_id: &SessionId) -> Option<Session> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let peer = tables.sessions.get(session_id)?.peer_a.clone();
        tables.take_session(&peer, now)
    }

    async fn is_session_live(&self, session_id: &SessionId) -> bool {
        let tables = self.tables.lock().await;
        tables.sessions.contains_key(session_id)
    }

    async fn sessions(&self) -> Vec<Session> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    async fn stats(&self) -> RelayStats {
        let tables = self.tables.lock().await;
        RelayStats {
            presence: tables.presence.snapshot(),
            searching: tables.queue.len(),
            active_sessions: tables.sessions.len(),
        }
    }
}
