//! UseCase: ピア検索（search / stop_search / next）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SearchPeerUseCase::search(): フィルタのティア判定、キューへの追加とペアリング
//! - SearchPeerUseCase::stop_search(): 検索の取り消し
//! - SearchPeerUseCase::next(): セッション終了と前回条件での再検索
//!
//! ### なぜこのテストが必要か
//! - 条件を満たさない上位フィルタが国フィルタだけに落とされることを保証
//! - セッション中の再検索で、前のセッションの相手に通知されることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：2 人の検索でセッション成立、国フィルタでの絞り込み
//! - 異常系：未登録のクライアントの検索、置き換えられた古いソケットからの検索
//! - エッジケース：残高不足の上位フィルタ、検索したことのないクライアントの next、
//!   国の変わる検索（国別集計の再配信）

use std::sync::Arc;

use deai_shared::time::Clock;

use crate::{
    config::RelayConfig,
    domain::{
        ClientId, ConnectionId, ConnectionRepository, EndReason, MatchRepository, SearchCriteria,
        SearchEntry, SearchResult, Timestamp,
    },
};

use super::{
    broadcast_presence::BroadcastPresenceUseCase, error::SearchError,
    session_lifecycle::SessionLifecycleUseCase,
};

/// A `search` request as received from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub criteria: SearchCriteria,
    /// `hasAdvancedFilters`
    pub wants_advanced: bool,
    /// `tasBalance`
    pub balance: f64,
}

/// ピア検索のユースケース
pub struct SearchPeerUseCase {
    /// ConnectionRepository（接続レジストリ）
    connection_repository: Arc<dyn ConnectionRepository>,
    /// MatchRepository（検索キューとセッション表）
    match_repository: Arc<dyn MatchRepository>,
    session_lifecycle: Arc<SessionLifecycleUseCase>,
    /// 検索で国が変わったときの国別集計の再配信に使用
    broadcast_presence: Arc<BroadcastPresenceUseCase>,
    config: RelayConfig,
    clock: Arc<dyn Clock>,
}

impl SearchPeerUseCase {
    /// 新しい SearchPeerUseCase を作成
    pub fn new(
        connection_repository: Arc<dyn ConnectionRepository>,
        match_repository: Arc<dyn MatchRepository>,
        session_lifecycle: Arc<SessionLifecycleUseCase>,
        broadcast_presence: Arc<BroadcastPresenceUseCase>,
        config: RelayConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection_repository,
            match_repository,
            session_lifecycle,
            broadcast_presence,
            config,
            clock,
        }
    }

    /// 検索を開始する
    ///
    /// セッション中であればそのセッションを終了します（相手には理由 `search` で通知）。
    /// 既に検索中であれば古いエントリを取り除き、キューの末尾に並び直します。
    ///
    /// # Returns
    ///
    /// * `Ok(SearchResult)` - キューに入った位置、または成立したセッション
    /// * `Err(SearchError)` - 未登録のクライアント、または `connection_id` のソケットが置き換えられている
    pub async fn search(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
        request: SearchRequest,
    ) -> Result<SearchResult, SearchError> {
        let SearchRequest {
            mut criteria,
            wants_advanced,
            balance,
        } = request;

        // 1. フィルタのティア判定
        let advanced_tier = self.config.grants_advanced(wants_advanced, balance);
        if !advanced_tier && criteria.filters.has_advanced() {
            tracing::warn!(
                "Dropping advanced filters of '{}' (requested: {}, balance: {})",
                client_id,
                wants_advanced,
                balance
            );
            criteria.filters = criteria.filters.without_advanced();
        }

        let entry = SearchEntry {
            client_id: client_id.clone(),
            connection_id,
            criteria,
            advanced_tier,
            enqueued_at: Timestamp::new(self.clock.now_millis()),
        };
        self.enqueue(entry, EndReason::Search).await
    }

    /// 検索を取り消す。検索中でなければ `false`
    pub async fn stop_search(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let stopped = self
            .match_repository
            .stop_search(client_id, connection_id)
            .await;
        if stopped {
            tracing::info!("Client '{}' stopped searching", client_id);
        }
        stopped
    }

    /// 現在のセッションを終了し、前回の検索条件で検索し直す
    ///
    /// # Returns
    ///
    /// * `Ok(Some(SearchResult))` - 再検索の結果
    /// * `Ok(None)` - 一度も検索していないため、再検索しなかった
    /// * `Err(SearchError)` - 未登録のクライアント
    pub async fn next(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Result<Option<SearchResult>, SearchError> {
        let connection = self
            .connection_repository
            .get(client_id)
            .await
            .filter(|c| c.connection_id == connection_id)
            .ok_or_else(|| SearchError::NotRegistered(client_id.as_str().to_string()))?;

        self.session_lifecycle
            .end_session(client_id, connection_id, EndReason::Next)
            .await;

        let Some(criteria) = connection.last_search else {
            tracing::debug!("Client '{}' has no previous search to repeat", client_id);
            return Ok(None);
        };
        let entry = SearchEntry {
            client_id: client_id.clone(),
            connection_id,
            criteria,
            advanced_tier: connection.advanced_tier,
            enqueued_at: Timestamp::new(self.clock.now_millis()),
        };
        self.enqueue(entry, EndReason::Next).await.map(Some)
    }

    async fn enqueue(
        &self,
        entry: SearchEntry,
        reason: EndReason,
    ) -> Result<SearchResult, SearchError> {
        let client_id = entry.client_id.clone();
        let outcome = self.match_repository.enqueue(entry).await?;

        if let Some(session) = &outcome.ended_session {
            self.session_lifecycle
                .notify_ended(session, &client_id, reason)
                .await;
        }

        if outcome.relocated {
            self.broadcast_presence.execute_if_by_country().await;
        }

        match &outcome.result {
            SearchResult::Queued { position } => {
                tracing::info!("Client '{}' is searching (position {})", client_id, position);
            }
            SearchResult::Paired(paired) => {
                self.session_lifecycle.announce(paired.clone()).await;
            }
        }
        Ok(outcome.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ClientConnection, Dialect, LocationHint, MessagePusher, SearchFilters,
        },
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryRelayStore,
        },
    };
    use deai_shared::time::FixedClock;
    use std::collections::HashMap;
    use tokio::sync::{Mutex, mpsc};

    struct Fixture {
        store: Arc<InMemoryRelayStore>,
        pusher: Arc<WebSocketMessagePusher>,
        usecase: SearchPeerUseCase,
    }

    fn create_fixture(config: RelayConfig) -> Fixture {
        let clock = Arc::new(FixedClock::new(1_000));
        let store = Arc::new(InMemoryRelayStore::new(clock.clone()));
        let pusher = Arc::new(WebSocketMessagePusher::new(Arc::new(Mutex::new(
            HashMap::new(),
        ))));
        let lifecycle = Arc::new(SessionLifecycleUseCase::new(
            store.clone(),
            store.clone(),
            pusher.clone(),
        ));
        let presence = Arc::new(BroadcastPresenceUseCase::new(
            store.clone(),
            pusher.clone(),
            config.clone(),
        ));
        let usecase = SearchPeerUseCase::new(
            store.clone(),
            store.clone(),
            lifecycle,
            presence,
            config,
            clock,
        );
        Fixture {
            store,
            pusher,
            usecase,
        }
    }

    fn id(value: &str) -> ClientId {
        ClientId::new(value.to_string()).unwrap()
    }

    fn cid(value: &str) -> ConnectionId {
        ConnectionId::fixed(value)
    }

    async fn connect(fixture: &Fixture, client_id: &str) -> mpsc::UnboundedReceiver<String> {
        let connection_id = cid(client_id);
        fixture
            .store
            .register(ClientConnection::new(
                id(client_id),
                connection_id,
                Dialect::Video,
                Timestamp::new(1_000),
            ))
            .await;
        let (tx, rx) = mpsc::unbounded_channel();
        fixture
            .pusher
            .register_client(id(client_id), connection_id, tx)
            .await;
        rx
    }

    fn located(country: &str, filter: Option<&str>) -> SearchRequest {
        SearchRequest {
            criteria: SearchCriteria {
                filters: SearchFilters {
                    country: filter.map(str::to_string),
                    ..SearchFilters::default()
                },
                location: Some(LocationHint {
                    country: Some(country.to_string()),
                    ..LocationHint::default()
                }),
                ..SearchCriteria::default()
            },
            ..SearchRequest::default()
        }
    }

    fn json(frame: Option<String>) -> serde_json::Value {
        serde_json::from_str(&frame.expect("no frame")).unwrap()
    }

    #[tokio::test]
    async fn test_two_searchers_are_paired() {
        // テスト項目: 2 人が検索すると、セッションが成立して両者に通知される
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let mut rx_a = connect(&fixture, "0xAAA").await;
        let mut rx_b = connect(&fixture, "0xBBB").await;

        // when (操作):
        let first = fixture
            .usecase
            .search(&id("0xAAA"), cid("0xAAA"), SearchRequest::default())
            .await;
        let second = fixture
            .usecase
            .search(&id("0xBBB"), cid("0xBBB"), SearchRequest::default())
            .await;

        // then (期待する結果):
        assert_eq!(first, Ok(SearchResult::Queued { position: 0 }));
        assert!(matches!(second, Ok(SearchResult::Paired(_))));
        assert_eq!(json(rx_a.recv().await)["isInitiator"], true);
        assert_eq!(json(rx_b.recv().await)["isInitiator"], false);
    }

    #[tokio::test]
    async fn test_country_filter_skips_incompatible_searcher() {
        // テスト項目: 国フィルタに合わない待機者は飛ばされ、合う待機者と成立する
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx_x = connect(&fixture, "X").await;
        let _rx_y = connect(&fixture, "Y").await;
        let _rx_z = connect(&fixture, "Z").await;
        fixture
            .usecase
            .search(&id("X"), cid("X"), located("US", Some("US")))
            .await
            .unwrap();

        // when (操作):
        let y = fixture
            .usecase
            .search(&id("Y"), cid("Y"), located("DE", Some("DE")))
            .await
            .unwrap();
        let z = fixture
            .usecase
            .search(&id("Z"), cid("Z"), located("US", Some("US")))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(y, SearchResult::Queued { position: 1 });
        match z {
            SearchResult::Paired(paired) => assert_eq!(paired.waiting.client_id, id("X")),
            other => panic!("expected pairing, got {:?}", other),
        }
        assert_eq!(fixture.store.stats().await.searching, 1);
    }

    #[tokio::test]
    async fn test_advanced_filters_dropped_without_balance() {
        // テスト項目: 残高が足りない場合、上位フィルタは落とされ国フィルタだけで検索される
        // given (前提条件):
        let fixture = create_fixture(RelayConfig {
            advanced_filter_min_balance: 50.0,
            ..RelayConfig::default()
        });
        let _rx = connect(&fixture, "alice").await;
        let mut request = located("JP", Some("JP"));
        request.criteria.filters.city = Some("Osaka".to_string());
        request.wants_advanced = true;
        request.balance = 10.0;

        // when (操作):
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), request)
            .await
            .unwrap();

        // then (期待する結果):
        let connection = fixture.store.get(&id("alice")).await.unwrap();
        let filters = connection.last_search.unwrap().filters;
        assert_eq!(filters.country, Some("JP".to_string()));
        assert_eq!(filters.city, None);
        assert!(!connection.advanced_tier);
    }

    #[tokio::test]
    async fn test_search_unregistered_client() {
        // テスト項目: 未登録のクライアントは検索できない
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());

        // when (操作):
        let result = fixture
            .usecase
            .search(&id("ghost"), cid("ghost"), SearchRequest::default())
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(SearchError::NotRegistered("ghost".to_string())));
    }

    #[tokio::test]
    async fn test_search_while_paired_notifies_old_peer() {
        // テスト項目: セッション中に検索し直すと、前の相手に理由 search で通知される
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx_a = connect(&fixture, "alice").await;
        let mut rx_b = connect(&fixture, "bob").await;
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), SearchRequest::default())
            .await
            .unwrap();
        fixture
            .usecase
            .search(&id("bob"), cid("bob"), SearchRequest::default())
            .await
            .unwrap();
        rx_b.recv().await;

        // when (操作):
        let result = fixture
            .usecase
            .search(&id("alice"), cid("alice"), SearchRequest::default())
            .await;

        // then (期待する結果): bob は idle に戻り、alice だけがキューにいる
        assert_eq!(result, Ok(SearchResult::Queued { position: 0 }));
        let ended = json(rx_b.recv().await);
        assert_eq!(ended["type"], "peer_disconnected");
        assert_eq!(ended["reason"], "search");
        assert_eq!(fixture.store.stats().await.searching, 1);
    }

    #[tokio::test]
    async fn test_stop_search() {
        // テスト項目: 検索を取り消すとキューから外れ、2 回目は false になる
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx = connect(&fixture, "alice").await;
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), SearchRequest::default())
            .await
            .unwrap();

        // when (操作):
        let first = fixture.usecase.stop_search(&id("alice"), cid("alice")).await;
        let second = fixture.usecase.stop_search(&id("alice"), cid("alice")).await;

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(fixture.store.stats().await.searching, 0);
    }

    #[tokio::test]
    async fn test_next_ends_session_and_searches_again() {
        // テスト項目: next で相手に理由 next が届き、自分は前回の条件でキューに戻る
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx_a = connect(&fixture, "alice").await;
        let mut rx_b = connect(&fixture, "bob").await;
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), located("JP", Some("JP")))
            .await
            .unwrap();
        fixture
            .usecase
            .search(&id("bob"), cid("bob"), located("JP", None))
            .await
            .unwrap();
        rx_b.recv().await;

        // when (操作):
        let result = fixture.usecase.next(&id("alice"), cid("alice")).await;

        // then (期待する結果):
        assert_eq!(result, Ok(Some(SearchResult::Queued { position: 0 })));
        let ended = json(rx_b.recv().await);
        assert_eq!(ended["reason"], "next");
        let stats = fixture.store.stats().await;
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.searching, 1);
        let connection = fixture.store.get(&id("alice")).await.unwrap();
        assert_eq!(
            connection.last_search.unwrap().filters.country,
            Some("JP".to_string())
        );
    }

    #[tokio::test]
    async fn test_next_without_previous_search() {
        // テスト項目: 一度も検索していないクライアントの next は何もしない
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx = connect(&fixture, "alice").await;

        // when (操作):
        let result = fixture.usecase.next(&id("alice"), cid("alice")).await;

        // then (期待する結果):
        assert_eq!(result, Ok(None));
        assert_eq!(fixture.store.stats().await.searching, 0);
    }

    #[tokio::test]
    async fn test_search_from_replaced_socket_is_rejected() {
        // テスト項目: 別のソケットに置き換えられた古い接続からの検索はキューに入らない
        // given (前提条件):
        let fixture = create_fixture(RelayConfig::default());
        let _rx = connect(&fixture, "alice").await;
        fixture
            .store
            .register(ClientConnection::new(
                id("alice"),
                ConnectionId::generate(),
                Dialect::Video,
                Timestamp::new(2_000),
            ))
            .await;

        // when (操作):
        let search = fixture
            .usecase
            .search(&id("alice"), cid("alice"), SearchRequest::default())
            .await;
        let next = fixture.usecase.next(&id("alice"), cid("alice")).await;

        // then (期待する結果):
        assert_eq!(search, Err(SearchError::NotRegistered("alice".to_string())));
        assert_eq!(next, Err(SearchError::NotRegistered("alice".to_string())));
        assert_eq!(fixture.store.stats().await.searching, 0);
    }

    #[tokio::test]
    async fn test_search_in_new_country_rebroadcasts_presence() {
        // テスト項目: 国別集計が有効なら、国の変わる検索で online_by_country が配信し直される
        // given (前提条件):
        let fixture = create_fixture(RelayConfig {
            presence_by_country: true,
            ..RelayConfig::default()
        });
        let _rx_a = connect(&fixture, "alice").await;
        let mut rx_b = connect(&fixture, "bob").await;

        // when (操作):
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), located("JP", Some("JP")))
            .await
            .unwrap();

        // then (期待する結果):
        let count = json(rx_b.recv().await);
        assert_eq!(count["type"], "online_count");
        assert_eq!(count["count"], 2);
        let by_country = json(rx_b.recv().await);
        assert_eq!(by_country["type"], "online_by_country");
        assert_eq!(by_country["countries"]["JP"], 1);

        // 同じ国での再検索では配信されない
        fixture
            .usecase
            .search(&id("alice"), cid("alice"), located("JP", Some("JP")))
            .await
            .unwrap();
        assert!(rx_b.try_recv().is_err());
    }
}
