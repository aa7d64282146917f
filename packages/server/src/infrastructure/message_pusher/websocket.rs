//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 各クライアントの送信キュー（`UnboundedSender`）を管理
//! - 通知（`Notification`）を JSON にエンコードして送信
//! - シグナリングメッセージを受け取ったフレームのまま転送
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された `UnboundedSender` を受け取り、メッセージ送信に使用します。
//! 送信キューは clientId ごとに 1 つで、どの接続（`ConnectionId`）のものかを
//! 一緒に保持します。古い接続の後始末が新しい接続のキューを消さないためです。
//!
//! 閉じたソケットへの送信は握りつぶし、そのキューを破棄します。レジストリからの
//! 登録解除は、そのソケットのタスク終了時の後始末が必ず行います。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{
        ClientId, ConnectionId, ErrorCode, MessagePushError, MessagePusher, Notification,
        PusherChannel,
    },
    infrastructure::dto::websocket::OutboundMessage,
};

/// 1 つのソケットの送信キュー
pub struct PusherEntry {
    connection_id: ConnectionId,
    sender: PusherChannel,
}

/// WebSocket を使った MessagePusher 実装
///
/// ## 使用例
///
/// ```ignore
/// let clients = Arc::new(Mutex::new(HashMap::new()));
/// let pusher = WebSocketMessagePusher::new(clients.clone());
///
/// pusher.push_to(&client_id, r#"{"type":"offer","offer":{}}"#).await?;
/// ```
pub struct WebSocketMessagePusher {
    /// 接続中のクライアントの送信キュー
    ///
    /// Key: ClientId
    /// Value: PusherEntry
    clients: Arc<Mutex<HashMap<ClientId, PusherEntry>>>,
}

impl WebSocketMessagePusher {
    /// 新しい WebSocketMessagePusher を作成
    pub fn new(clients: Arc<Mutex<HashMap<ClientId, PusherEntry>>>) -> Self {
        Self { clients }
    }

    fn encode(notification: &Notification) -> Result<String, MessagePushError> {
        OutboundMessage::from(notification)
            .to_json()
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))
    }

    /// 送信に失敗したキューは、同じ接続のものであれば破棄する
    fn send_or_evict(
        clients: &mut HashMap<ClientId, PusherEntry>,
        client_id: &ClientId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        let Some(entry) = clients.get(client_id) else {
            return Err(MessagePushError::ClientNotFound(
                client_id.as_str().to_string(),
            ));
        };
        match entry.sender.send(content.to_string()) {
            Ok(()) => Ok(()),
            Err(e) => {
                clients.remove(client_id);
                tracing::debug!("Evicted closed outbound queue of '{}'", client_id);
                Err(MessagePushError::PushFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(
        &self,
        client_id: ClientId,
        connection_id: ConnectionId,
        sender: PusherChannel,
    ) -> bool {
        let mut clients = self.clients.lock().await;
        let previous = clients.insert(
            client_id.clone(),
            PusherEntry {
                connection_id,
                sender,
            },
        );
        tracing::debug!("Client '{}' registered to MessagePusher", client_id);

        match previous {
            Some(old) if old.connection_id != connection_id => {
                // 古いソケットに置き換えを通知し、キューを破棄して閉じさせる
                let notice = Notification::error(
                    ErrorCode::Replaced,
                    "this client id was registered on another connection",
                );
                if let Ok(json) = Self::encode(&notice) {
                    let _ = old.sender.send(json);
                }
                true
            }
            _ => false,
        }
    }

    async fn unregister_client(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let mut clients = self.clients.lock().await;
        let owned = clients
            .get(client_id)
            .is_some_and(|entry| entry.connection_id == connection_id);
        if owned {
            clients.remove(client_id);
            tracing::debug!("Client '{}' unregistered from MessagePusher", client_id);
        }
        owned
    }

    async fn push_to(&self, client_id: &ClientId, content: &str) -> Result<(), MessagePushError> {
        let mut clients = self.clients.lock().await;
        Self::send_or_evict(&mut clients, client_id, content)?;
        tracing::debug!("Pushed message to client '{}'", client_id);
        Ok(())
    }

    async fn notify(
        &self,
        client_id: &ClientId,
        notification: &Notification,
    ) -> Result<(), MessagePushError> {
        let json = Self::encode(notification)?;
        self.push_to(client_id, &json).await
    }

    async fn broadcast(&self, targets: Vec<ClientId>, notification: &Notification) -> usize {
        let json = match Self::encode(notification) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to encode broadcast: {}", e);
                return 0;
            }
        };

        let mut clients = self.clients.lock().await;
        let mut delivered = 0;
        for target in targets {
            // ブロードキャストでは一部の送信失敗を許容
            match Self::send_or_evict(&mut clients, &target, &json) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Skipped broadcast to '{}': {}", target, e),
            }
        }
        delivered
    }
}
