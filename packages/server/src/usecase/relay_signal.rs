//! UseCase: シグナリング中継
//!
//! SDP（offer / answer）・ICE candidate・チャット・通話の意思表示を、
//! セッションの相手にそのまま転送します。中継するフレームは受け取った
//! テキストそのもので、サーバーはシリアライズし直しません。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RelaySignalUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 相手にだけ、受け取ったままのフレームが届くことを保証
//! - セッション外のシグナリングが誰にも届かないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：offer の転送と、それによる通話状態への遷移
//! - 異常系：セッションがない、相手の送信キューが閉じている、置き換えられた古いソケットからの送信

use std::sync::Arc;

use crate::domain::{ClientId, ConnectionId, MatchRepository, MessagePusher};

use super::error::RelayError;

/// Kind of a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Chat,
    CallIntent,
}

impl SignalKind {
    /// SDP and ICE traffic means the call is being set up.
    fn starts_call(&self) -> bool {
        matches!(
            self,
            SignalKind::Offer | SignalKind::Answer | SignalKind::IceCandidate
        )
    }
}

/// シグナリング中継のユースケース
pub struct RelaySignalUseCase {
    /// MatchRepository（セッション表）
    match_repository: Arc<dyn MatchRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl RelaySignalUseCase {
    /// 新しい RelaySignalUseCase を作成
    pub fn new(
        match_repository: Arc<dyn MatchRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            match_repository,
            message_pusher,
        }
    }

    /// フレームをセッションの相手に転送する
    ///
    /// # Arguments
    ///
    /// * `sender` - 送信者の clientId
    /// * `connection_id` - 送信者のソケットの接続 ID
    /// * `kind` - フレームの種類
    /// * `frame` - 受け取ったテキストフレーム
    ///
    /// # Returns
    ///
    /// * `Ok(ClientId)` - 転送先の clientId
    /// * `Err(RelayError)` - セッションがない、または相手に届かなかった
    pub async fn execute(
        &self,
        sender: &ClientId,
        connection_id: ConnectionId,
        kind: SignalKind,
        frame: &str,
    ) -> Result<ClientId, RelayError> {
        let peer = self
            .match_repository
            .peer_of(sender, connection_id, kind.starts_call())
            .await
            .ok_or_else(|| RelayError::NoActiveSession(sender.as_str().to_string()))?;

        self.message_pusher
            .push_to(&peer, frame)
            .await
            .map_err(|_| RelayError::PeerUnreachable(peer.as_str().to_string()))?;

        tracing::debug!("Relayed {:?} from '{}' to '{}'", kind, sender, peer);
        Ok(peer)
    }
}
