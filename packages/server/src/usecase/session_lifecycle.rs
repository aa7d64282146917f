//! UseCase: セッションのライフサイクル（成立の通知・終了と相手への通知）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SessionLifecycleUseCase::announce(): 両ピアへの peer_found / chat_matched 通知
//! - SessionLifecycleUseCase::end_session(): セッション終了と残ったピアへの通知
//! - 通知に失敗したときのペアリングの巻き戻し
//! - 通知中に終了したセッションの通知順序
//!
//! ### なぜこのテストが必要か
//! - 発信側（isInitiator）がちょうど 1 人であることを保証
//! - 終了通知が 1 回だけ、残ったピアにだけ届くことを保証
//! - 届かないピアとのセッションが残り続けないことを保証
//! - 終了済みのセッションの peer_found が最後に届くことがないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：両者への通知、end_call による終了
//! - 異常系：片方の送信キューが閉じている（先に通知した側 / 後に通知した側）
//! - エッジケース：両方のピアからの同時終了、通知の途中での切断

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    ClientId, ConnectionId, ConnectionRepository, DisclosedLocation, EndReason, MatchRepository,
    MessagePusher, Notification, PairedSession, SearchEntry, SearchResult, Session,
};

/// セッションのライフサイクルのユースケース
pub struct SessionLifecycleUseCase {
    /// ConnectionRepository（接続レジストリ）
    connection_repository: Arc<dyn ConnectionRepository>,
    /// MatchRepository（検索キューとセッション表）
    match_repository: Arc<dyn MatchRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    /// 成立通知と終了通知を直列化する（同じセッションの peer_found が終了通知を追い越さない）
    notices: Mutex<()>,
}

impl SessionLifecycleUseCase {
    /// 新しい SessionLifecycleUseCase を作成
    pub fn new(
        connection_repository: Arc<dyn ConnectionRepository>,
        match_repository: Arc<dyn MatchRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            connection_repository,
            match_repository,
            message_pusher,
            notices: Mutex::new(()),
        }
    }

    /// 成立したセッションを両ピアに通知する
    ///
    /// 先に待っていた側から通知します。どちらかに届かなかった場合はセッションを
    /// 終了し（理由 `peer_unavailable`）、残った側を元の検索エントリで
    /// キューに戻します。戻した結果また成立したセッションも同様に通知します。
    ///
    /// 通知する前に既に終了していたセッションは通知しません（終了通知は終了させた側が送る）。
    pub async fn announce(&self, paired: PairedSession) {
        let mut pending = vec![paired];
        while let Some(paired) = pending.pop() {
            if let Some(rematched) = self.announce_once(paired).await {
                pending.push(rematched);
            }
        }
    }

    async fn announce_once(&self, paired: PairedSession) -> Option<PairedSession> {
        let PairedSession {
            session,
            waiting,
            entrant,
        } = paired;

        let notices = self.notices.lock().await;
        if !self.match_repository.is_session_live(&session.id).await {
            tracing::debug!("Session {} ended before it was announced", session.id);
            return None;
        }

        let mut announced = false;
        for (recipient, peer) in [(&waiting, &entrant), (&entrant, &waiting)] {
            let notification = self.peer_found(&session, recipient, peer).await;
            if let Err(e) = self
                .message_pusher
                .notify(&recipient.client_id, &notification)
                .await
            {
                tracing::warn!(
                    "Failed to announce session {} to '{}': {}",
                    session.id,
                    recipient.client_id,
                    e
                );
                drop(notices);
                return self
                    .abort_pairing(&session, &recipient.client_id, peer, announced)
                    .await;
            }
            announced = true;
        }
        drop(notices);

        tracing::info!(
            "Session {} started: '{}' <-> '{}'",
            session.id,
            session.peer_a,
            session.peer_b
        );
        None
    }

    async fn peer_found(
        &self,
        session: &Session,
        recipient: &SearchEntry,
        peer: &SearchEntry,
    ) -> Notification {
        let dialect = self
            .connection_repository
            .get(&recipient.client_id)
            .await
            .map(|c| c.dialect)
            .unwrap_or_default();

        Notification::PeerFound {
            dialect,
            session_id: session.id.clone(),
            peer_id: peer.client_id.clone(),
            is_initiator: session.initiator() == &recipient.client_id,
            peer_location: DisclosedLocation::for_recipient(
                peer.criteria.location.as_ref(),
                recipient.advanced_tier,
            ),
        }
    }

    async fn abort_pairing(
        &self,
        session: &Session,
        unreachable: &ClientId,
        survivor: &SearchEntry,
        survivor_announced: bool,
    ) -> Option<PairedSession> {
        // Someone else already ended it; the survivor is no longer ours to requeue.
        let ended = self.match_repository.end_session_by_id(&session.id).await?;
        if survivor_announced {
            self.notify_ended(&ended, unreachable, EndReason::PeerUnavailable)
                .await;
        }

        match self.match_repository.enqueue(survivor.clone()).await {
            Ok(outcome) => match outcome.result {
                SearchResult::Paired(rematched) => Some(rematched),
                SearchResult::Queued { position } => {
                    tracing::debug!(
                        "Requeued '{}' at position {}",
                        survivor.client_id,
                        position
                    );
                    None
                }
            },
            Err(e) => {
                tracing::debug!("Could not requeue '{}': {}", survivor.client_id, e);
                None
            }
        }
    }

    /// クライアントのセッションを終了し、相手に通知する
    ///
    /// # Returns
    ///
    /// * `Some(Session)` - この呼び出しで終了したセッション
    /// * `None` - セッションがない、既に他の呼び出しで終了済み、または
    ///   `connection_id` のソケットが既に置き換えられている
    pub async fn end_session(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
        reason: EndReason,
    ) -> Option<Session> {
        let ended = self
            .match_repository
            .end_session(client_id, connection_id)
            .await?;
        self.notify_ended(&ended, client_id, reason).await;
        Some(ended)
    }

    /// 終了したセッションの相手側（`ended_by` ではない方）に通知する
    ///
    /// 相手が既に切断している場合は何もしません。
    pub async fn notify_ended(&self, session: &Session, ended_by: &ClientId, reason: EndReason) {
        let Some(peer) = session.peer_of(ended_by) else {
            return;
        };
        tracing::info!(
            "Session {} ended by '{}' ({})",
            session.id,
            ended_by,
            reason.as_str()
        );

        let notification = Notification::SessionEnded {
            session_id: session.id.clone(),
            reason,
        };
        let _notices = self.notices.lock().await;
        if let Err(e) = self.message_pusher.notify(peer, &notification).await {
            tracing::debug!("Peer '{}' was not notified: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ClientConnection, Dialect, LocationHint, MessagePushError, MockMessagePusher,
            PusherChannel, SearchCriteria, Timestamp,
        },
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryRelayStore,
        },
    };
    use async_trait::async_trait;
    use deai_shared::time::FixedClock;
    use std::collections::HashMap;
    use tokio::sync::{Mutex, mpsc, oneshot};

    fn id(value: &str) -> ClientId {
        ClientId::new(value.to_string()).unwrap()
    }

    fn create_test_store() -> Arc<InMemoryRelayStore> {
        Arc::new(InMemoryRelayStore::new(Arc::new(FixedClock::new(1_000))))
    }

    fn create_test_message_pusher() -> Arc<WebSocketMessagePusher> {
        let clients = Arc::new(Mutex::new(HashMap::new()));
        Arc::new(WebSocketMessagePusher::new(clients))
    }

    fn create_usecase(
        store: &Arc<InMemoryRelayStore>,
        pusher: Arc<dyn MessagePusher>,
    ) -> SessionLifecycleUseCase {
        SessionLifecycleUseCase::new(store.clone(), store.clone(), pusher)
    }

    /// ストアと Pusher の両方に登録し、送信キューの受信側を返す
    async fn connect(
        store: &InMemoryRelayStore,
        pusher: &WebSocketMessagePusher,
        client_id: &str,
        dialect: Dialect,
    ) -> mpsc::UnboundedReceiver<String> {
        let connection_id = ConnectionId::fixed(client_id);
        store
            .register(ClientConnection::new(
                id(client_id),
                connection_id,
                dialect,
                Timestamp::new(1_000),
            ))
            .await;
        let (tx, rx) = mpsc::unbounded_channel();
        pusher.register_client(id(client_id), connection_id, tx).await;
        rx
    }

    fn entry(client_id: &str, enqueued_at: i64, country: Option<&str>) -> SearchEntry {
        SearchEntry {
            client_id: id(client_id),
            connection_id: ConnectionId::fixed(client_id),
            criteria: SearchCriteria {
                location: country.map(|c| LocationHint {
                    country: Some(c.to_string()),
                    city: Some("Somewhere".to_string()),
                    ..LocationHint::default()
                }),
                ..SearchCriteria::default()
            },
            advanced_tier: false,
            enqueued_at: Timestamp::new(enqueued_at),
        }
    }

    async fn pair(store: &InMemoryRelayStore, waiting: SearchEntry, entrant: SearchEntry) -> PairedSession {
        store.enqueue(waiting).await.unwrap();
        match store.enqueue(entrant).await.unwrap().result {
            SearchResult::Paired(paired) => paired,
            other => panic!("expected pairing, got {:?}", other),
        }
    }

    fn json(frame: Option<String>) -> serde_json::Value {
        serde_json::from_str(&frame.expect("no frame")).unwrap()
    }

    #[tokio::test]
    async fn test_announce_notifies_both_peers_with_one_initiator() {
        // テスト項目: 両ピアに通知され、辞書順で小さい方だけが発信側になる
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let mut rx_b = connect(&store, &pusher, "0xBBB", Dialect::Video).await;
        let mut rx_a = connect(&store, &pusher, "0xAAA", Dialect::Video).await;
        let paired = pair(&store, entry("0xBBB", 1, None), entry("0xAAA", 2, None)).await;

        // when (操作):
        usecase.announce(paired.clone()).await;

        // then (期待する結果):
        let to_a = json(rx_a.recv().await);
        let to_b = json(rx_b.recv().await);
        assert_eq!(to_a["type"], "peer_found");
        assert_eq!(to_a["peerId"], "0xBBB");
        assert_eq!(to_a["isInitiator"], true);
        assert_eq!(to_b["peerId"], "0xAAA");
        assert_eq!(to_b["isInitiator"], false);
        assert_eq!(to_a["sessionId"], paired.session.id.as_str());
        assert_eq!(to_a["sessionId"], to_b["sessionId"]);
    }

    #[tokio::test]
    async fn test_announce_uses_recipient_dialect() {
        // テスト項目: chat_register したクライアントには chat_matched が届く
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let mut rx_chat = connect(&store, &pusher, "chatter", Dialect::Chat).await;
        let mut rx_video = connect(&store, &pusher, "viewer", Dialect::Video).await;
        let paired = pair(&store, entry("chatter", 1, None), entry("viewer", 2, None)).await;

        // when (操作):
        usecase.announce(paired).await;

        // then (期待する結果):
        assert_eq!(json(rx_chat.recv().await)["type"], "chat_matched");
        assert_eq!(json(rx_video.recv().await)["type"], "peer_found");
    }

    #[tokio::test]
    async fn test_announce_discloses_country_to_basic_recipient() {
        // テスト項目: 基本ティアの受信者には相手の国だけが開示される
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let _rx_a = connect(&store, &pusher, "alice", Dialect::Video).await;
        let mut rx_b = connect(&store, &pusher, "bob", Dialect::Video).await;
        let paired = pair(&store, entry("alice", 1, Some("JP")), entry("bob", 2, None)).await;

        // when (操作):
        usecase.announce(paired).await;

        // then (期待する結果):
        let to_b = json(rx_b.recv().await);
        assert_eq!(to_b["peerLocation"], serde_json::json!({"country": "JP"}));
    }

    #[tokio::test]
    async fn test_end_session_notifies_remaining_peer_once() {
        // テスト項目: end_call で残ったピアに call_ended が 1 回だけ届く
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let mut rx_a = connect(&store, &pusher, "alice", Dialect::Video).await;
        let mut rx_b = connect(&store, &pusher, "bob", Dialect::Video).await;
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;

        // when (操作):
        let first = usecase
            .end_session(&id("alice"), ConnectionId::fixed("alice"), EndReason::EndCall)
            .await;
        let second = usecase
            .end_session(&id("bob"), ConnectionId::fixed("bob"), EndReason::EndCall)
            .await;

        // then (期待する結果):
        assert_eq!(first.map(|s| s.id), Some(paired.session.id.clone()));
        assert_eq!(second, None);
        let to_b = json(rx_b.recv().await);
        assert_eq!(to_b["type"], "call_ended");
        assert_eq!(to_b["reason"], "end_call");
        assert!(rx_b.try_recv().is_err());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_entrant_requeues_announced_peer() {
        // テスト項目: 後から通知する側に届かない場合、通知済みの側に peer_unavailable が届きキューに戻る
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let mut rx_a = connect(&store, &pusher, "alice", Dialect::Video).await;
        let rx_b = connect(&store, &pusher, "bob", Dialect::Video).await;
        drop(rx_b);
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;

        // when (操作):
        usecase.announce(paired.clone()).await;

        // then (期待する結果):
        assert_eq!(json(rx_a.recv().await)["type"], "peer_found");
        let ended = json(rx_a.recv().await);
        assert_eq!(ended["type"], "peer_disconnected");
        assert_eq!(ended["reason"], "peer_unavailable");
        let stats = store.stats().await;
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.searching, 1);
    }

    #[tokio::test]
    async fn test_unreachable_waiting_peer_requeues_entrant_silently() {
        // テスト項目: 先に通知する側に届かない場合、相手には何も送らずにキューに戻す
        // given (前提条件):
        let store = create_test_store();
        for client in ["alice", "bob"] {
            store
                .register(ClientConnection::new(
                    id(client),
                    ConnectionId::fixed(client),
                    Dialect::Video,
                    Timestamp::new(1_000),
                ))
                .await;
        }
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;

        let mut pusher = MockMessagePusher::new();
        pusher
            .expect_notify()
            .times(1)
            .returning(|client_id, _| Err(MessagePushError::PushFailed(client_id.to_string())));
        let usecase = create_usecase(&store, Arc::new(pusher));

        // when (操作):
        usecase.announce(paired).await;

        // then (期待する結果): bob は元のエントリでキューに戻っている
        let stats = store.stats().await;
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.searching, 1);
        assert!(
            store
                .peer_of(&id("bob"), ConnectionId::fixed("bob"), false)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_requeued_peer_is_announced_to_next_match() {
        // テスト項目: キューに戻したピアが別の待機者と成立した場合、その新しいセッションも通知される
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let rx_a = connect(&store, &pusher, "alice", Dialect::Video).await;
        let mut rx_b = connect(&store, &pusher, "bob", Dialect::Video).await;
        let mut rx_c = connect(&store, &pusher, "carol", Dialect::Video).await;
        drop(rx_a);
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;
        store.enqueue(entry("carol", 3, None)).await.unwrap();

        // when (操作):
        usecase.announce(paired).await;

        // then (期待する結果):
        assert_eq!(json(rx_b.recv().await)["peerId"], "carol");
        assert_eq!(json(rx_c.recv().await)["peerId"], "bob");
        assert_eq!(store.stats().await.active_sessions, 1);
    }

    #[tokio::test]
    async fn test_session_ended_before_announcement_is_not_announced() {
        // テスト項目: 通知する前に終了したセッションの peer_found は送られない
        // given (前提条件):
        let store = create_test_store();
        let pusher = create_test_message_pusher();
        let usecase = create_usecase(&store, pusher.clone());
        let mut rx_a = connect(&store, &pusher, "alice", Dialect::Video).await;
        let mut rx_b = connect(&store, &pusher, "bob", Dialect::Video).await;
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;
        store
            .end_session(&id("alice"), ConnectionId::fixed("alice"))
            .await
            .unwrap();

        // when (操作):
        usecase.announce(paired).await;

        // then (期待する結果):
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    /// 指定したクライアントへの peer_found を送った直後に合図を出し、他のタスクに実行を譲る Pusher
    struct YieldingPusher {
        inner: Arc<WebSocketMessagePusher>,
        trigger_on: ClientId,
        trigger: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl MessagePusher for YieldingPusher {
        async fn register_client(
            &self,
            client_id: ClientId,
            connection_id: ConnectionId,
            sender: PusherChannel,
        ) -> bool {
            self.inner
                .register_client(client_id, connection_id, sender)
                .await
        }

        async fn unregister_client(
            &self,
            client_id: &ClientId,
            connection_id: ConnectionId,
        ) -> bool {
            self.inner.unregister_client(client_id, connection_id).await
        }

        async fn push_to(
            &self,
            client_id: &ClientId,
            content: &str,
        ) -> Result<(), MessagePushError> {
            self.inner.push_to(client_id, content).await
        }

        async fn notify(
            &self,
            client_id: &ClientId,
            notification: &Notification,
        ) -> Result<(), MessagePushError> {
            let result = self.inner.notify(client_id, notification).await;
            let fire = matches!(notification, Notification::PeerFound { .. })
                && client_id == &self.trigger_on;
            let trigger = if fire {
                self.trigger.lock().unwrap().take()
            } else {
                None
            };
            if let Some(trigger) = trigger {
                let _ = trigger.send(());
                for _ in 0..8 {
                    tokio::task::yield_now().await;
                }
            }
            result
        }

        async fn broadcast(&self, targets: Vec<ClientId>, notification: &Notification) -> usize {
            self.inner.broadcast(targets, notification).await
        }
    }

    #[tokio::test]
    async fn test_disconnect_during_announcement_ends_after_peer_found() {
        // テスト項目: 成立通知の途中で片方が切断しても、残った側には peer_found の後に終了通知が届く
        // given (前提条件): alice への peer_found の直後に alice のソケットが閉じる
        let store = create_test_store();
        let inner = create_test_message_pusher();
        let _rx_a = connect(&store, &inner, "alice", Dialect::Video).await;
        let mut rx_b = connect(&store, &inner, "bob", Dialect::Video).await;
        let (trigger, triggered) = oneshot::channel();
        let pusher = Arc::new(YieldingPusher {
            inner,
            trigger_on: id("alice"),
            trigger: std::sync::Mutex::new(Some(trigger)),
        });
        let usecase = Arc::new(create_usecase(&store, pusher));
        let paired = pair(&store, entry("alice", 1, None), entry("bob", 2, None)).await;

        let teardown = {
            let store = store.clone();
            let usecase = usecase.clone();
            tokio::spawn(async move {
                triggered.await.unwrap();
                let outcome = store
                    .unregister(&id("alice"), ConnectionId::fixed("alice"))
                    .await
                    .unwrap();
                let session = outcome.ended_session.unwrap();
                usecase
                    .notify_ended(&session, &id("alice"), EndReason::SocketClosed)
                    .await;
            })
        };

        // when (操作):
        usecase.announce(paired.clone()).await;
        teardown.await.unwrap();

        // then (期待する結果):
        let first = json(rx_b.recv().await);
        assert_eq!(first["type"], "peer_found");
        assert_eq!(first["sessionId"], paired.session.id.as_str());
        let last = json(rx_b.recv().await);
        assert_eq!(last["type"], "peer_disconnected");
        assert_eq!(last["sessionId"], paired.session.id.as_str());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(store.stats().await.active_sessions, 0);
    }
}
