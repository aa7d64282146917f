//! UseCase: クライアント登録処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RegisterClientUseCase::execute() メソッド
//! - clientId の検証、匿名 ID の払い出し、再接続時の置き換え
//!
//! ### なぜこのテストが必要か
//! - 同じ clientId の二重登録（プレゼンスの二重カウント）を防ぐ
//! - 置き換えられた古い接続のセッションが残らないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：ウォレットアドレスでの登録、匿名での登録
//! - 異常系：不正な clientId
//! - エッジケース：セッション中のクライアントが別のソケットから再登録、同じソケットからの再登録

use std::sync::Arc;

use deai_shared::time::Clock;

use crate::domain::{
    ClientConnection, ClientId, ConnectionId, ConnectionRepository, Dialect, EndReason,
    MessagePusher, Notification, PusherChannel, Timestamp,
};

use super::{error::RegisterError, session_lifecycle::SessionLifecycleUseCase};

/// クライアント登録のユースケース
pub struct RegisterClientUseCase {
    /// ConnectionRepository（接続レジストリ）
    connection_repository: Arc<dyn ConnectionRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    /// 置き換えで終了したセッションの通知に使用
    session_lifecycle: Arc<SessionLifecycleUseCase>,
    clock: Arc<dyn Clock>,
}

impl RegisterClientUseCase {
    /// 新しい RegisterClientUseCase を作成
    pub fn new(
        connection_repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        session_lifecycle: Arc<SessionLifecycleUseCase>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection_repository,
            message_pusher,
            session_lifecycle,
            clock,
        }
    }

    /// クライアント登録を実行
    ///
    /// # Arguments
    ///
    /// * `requested_id` - クライアントが名乗った ID（ウォレットアドレス）。`None` なら匿名 ID を払い出す
    /// * `connection_id` - 登録するソケットの接続 ID
    /// * `dialect` - `register` / `chat_register` のどちらで登録したか
    /// * `sender` - クライアントへのメッセージ送信用チャンネル
    ///
    /// # Returns
    ///
    /// * `Ok(ClientId)` - 登録された clientId
    /// * `Err(RegisterError)` - clientId の形式が不正
    pub async fn execute(
        &self,
        requested_id: Option<String>,
        connection_id: ConnectionId,
        dialect: Dialect,
        sender: PusherChannel,
    ) -> Result<ClientId, RegisterError> {
        // 1. clientId の決定
        let client_id = match requested_id {
            Some(raw) => ClientId::new(raw)?,
            None => ClientId::generate_anonymous(),
        };

        // 2. Repository に登録（古い接続があれば置き換え）
        let connection = ClientConnection::new(
            client_id.clone(),
            connection_id,
            dialect,
            Timestamp::new(self.clock.now_millis()),
        );
        let outcome = self.connection_repository.register(connection).await;

        // 3. MessagePusher に送信キューを登録（古いソケットには replaced が届く）
        self.message_pusher
            .register_client(client_id.clone(), connection_id, sender)
            .await;

        if outcome.replaced.is_some() {
            tracing::info!("Client '{}' reconnected on a new socket", client_id);
        }
        if let Some(session) = &outcome.ended_session {
            self.session_lifecycle
                .notify_ended(session, &client_id, EndReason::Replaced)
                .await;
        }

        // 4. 登録完了を通知
        let registered = Notification::Registered {
            client_id: client_id.clone(),
        };
        if let Err(e) = self.message_pusher.notify(&client_id, &registered).await {
            tracing::warn!("Failed to acknowledge registration of '{}': {}", client_id, e);
        }

        Ok(client_id)
    }

    /// `client_id` がまだこの接続に登録されているか（再接続で置き換えられていないか）
    pub async fn is_current(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        self.connection_repository
            .is_current(client_id, connection_id)
            .await
    }
}
