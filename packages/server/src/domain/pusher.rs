//! MessagePusher trait 定義
//!
//! クライアントへのメッセージ送信（通知）のインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    error::MessagePushError,
    notification::Notification,
    value_object::{ClientId, ConnectionId},
};

/// Outbound queue of one socket. Each frame is a serialized text message.
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// Delivery of frames into clients' outbound queues.
///
/// Every method is non-blocking: a push only enqueues into the target's
/// unbounded channel, so a slow client never stalls the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Bind `client_id` to a socket's outbound queue.
    ///
    /// Returns `true` if a queue of an older connection was replaced. The old
    /// socket is told it was replaced and its queue is dropped, which closes it.
    async fn register_client(
        &self,
        client_id: ClientId,
        connection_id: ConnectionId,
        sender: PusherChannel,
    ) -> bool;

    /// Remove the queue, but only if it still belongs to `connection_id`.
    async fn unregister_client(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool;

    /// Forward a raw frame verbatim.
    async fn push_to(&self, client_id: &ClientId, content: &str) -> Result<(), MessagePushError>;

    /// Encode and deliver a server notification.
    async fn notify(
        &self,
        client_id: &ClientId,
        notification: &Notification,
    ) -> Result<(), MessagePushError>;

    /// Deliver one notification to many clients. Individual failures are
    /// swallowed; returns the number of clients reached.
    async fn broadcast(&self, targets: Vec<ClientId>, notification: &Notification) -> usize;
}
