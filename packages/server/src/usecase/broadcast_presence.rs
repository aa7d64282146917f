//! UseCase: オンライン人数の配信
//!
//! 接続レジストリが変わるたびに UI 層から呼ばれ、登録済みの全クライアントに
//! `online_count`（設定により `online_by_country` も）を送ります。
//! 送信は送信キューへの追加だけなので、遅いクライアントが呼び出し側を待たせることはありません。
//! 集計の取得から配信までを直列化し、古い人数が新しい人数の後に届かないようにしています。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - BroadcastPresenceUseCase::execute() / execute_if_by_country() メソッド
//!
//! ### なぜこのテストが必要か
//! - 全クライアントが最新のオンライン人数を最後に受け取ることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：全員への配信、国別集計の配信
//! - エッジケース：配信の途中で別の配信が始まる

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    config::RelayConfig,
    domain::{ClientConnection, ConnectionRepository, MessagePusher, Notification},
};

/// オンライン人数配信のユースケース
pub struct BroadcastPresenceUseCase {
    /// ConnectionRepository（接続レジストリ）
    connection_repository: Arc<dyn ConnectionRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    config: RelayConfig,
    /// 集計の取得と配信を 1 組ずつ行う
    broadcasts: Mutex<()>,
}

impl BroadcastPresenceUseCase {
    /// 新しい BroadcastPresenceUseCase を作成
    pub fn new(
        connection_repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            connection_repository,
            message_pusher,
            config,
            broadcasts: Mutex::new(()),
        }
    }

    /// 現在のオンライン人数を全クライアントに配信する
    ///
    /// # Returns
    ///
    /// `online_count` が届いたクライアントの数
    pub async fn execute(&self) -> usize {
        let _broadcasts = self.broadcasts.lock().await;
        let snapshot = self.connection_repository.presence().await;
        let targets = self
            .connection_repository
            .client_ids_where(&|_: &ClientConnection| true)
            .await;

        let delivered = self
            .message_pusher
            .broadcast(
                targets.clone(),
                &Notification::OnlineCount {
                    count: snapshot.online,
                },
            )
            .await;
        if self.config.presence_by_country {
            self.message_pusher
                .broadcast(targets, &Notification::OnlineByCountry(snapshot.clone()))
                .await;
        }

        tracing::debug!(
            "Broadcasted online count {} to {} clients",
            snapshot.online,
            delivered
        );
        delivered
    }

    /// 国別集計が有効な場合だけ配信する（位置情報だけが変わったとき）
    pub async fn execute_if_by_country(&self) -> usize {
        if !self.config.presence_by_country {
            return 0;
        }
        self.execute().await
    }
}
