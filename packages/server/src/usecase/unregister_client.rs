//! UseCase: クライアント登録解除処理
//!
//! ソケットの切断・`disconnect` メッセージ・同じソケットでの別 ID への再登録で
//! 呼ばれます。検索エントリとセッションを片付け、セッションの相手に通知します。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - UnregisterClientUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 切断後にキューやセッション表に古いエントリが残らないことを保証
//! - 相手への通知がちょうど 1 回であることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：セッション中のクライアントの切断
//! - エッジケース：既に置き換えられた古い接続からの登録解除、二重の登録解除

use std::sync::Arc;

use crate::domain::{
    ClientId, ConnectionId, ConnectionRepository, EndReason, MessagePusher, UnregisterOutcome,
};

use super::session_lifecycle::SessionLifecycleUseCase;

/// クライアント登録解除のユースケース
pub struct UnregisterClientUseCase {
    /// ConnectionRepository（接続レジストリ）
    connection_repository: Arc<dyn ConnectionRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    session_lifecycle: Arc<SessionLifecycleUseCase>,
}

impl UnregisterClientUseCase {
    /// 新しい UnregisterClientUseCase を作成
    pub fn new(
        connection_repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        session_lifecycle: Arc<SessionLifecycleUseCase>,
    ) -> Self {
        Self {
            connection_repository,
            message_pusher,
            session_lifecycle,
        }
    }

    /// 登録解除を実行
    ///
    /// # Arguments
    ///
    /// * `client_id` - 登録解除するクライアントの ID
    /// * `connection_id` - 登録解除を要求したソケットの接続 ID
    /// * `reason` - セッションの相手に伝える終了理由
    ///
    /// # Returns
    ///
    /// * `Some(UnregisterOutcome)` - 登録解除した接続と、終了したセッション
    /// * `None` - 既に登録解除済み、または別のソケットに置き換えられている
    pub async fn execute(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
        reason: EndReason,
    ) -> Option<UnregisterOutcome> {
        // 1. Repository から削除（検索エントリとセッションも同時に片付く）
        let Some(outcome) = self
            .connection_repository
            .unregister(client_id, connection_id)
            .await
        else {
            tracing::debug!(
                "Skipped unregister of '{}': connection {} is no longer current",
                client_id,
                connection_id
            );
            return None;
        };

        // 2. MessagePusher から送信キューを削除
        self.message_pusher
            .unregister_client(client_id, connection_id)
            .await;
        tracing::info!("Client '{}' unregistered ({})", client_id, reason.as_str());

        // 3. セッションの相手に通知
        if let Some(session) = &outcome.ended_session {
            self.session_lifecycle
                .notify_ended(session, client_id, reason)
                .await;
        }

        Some(outcome)
    }
}
