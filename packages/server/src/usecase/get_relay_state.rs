//! UseCase: リレーの状態取得（HTTP API 用）

use std::sync::Arc;

use crate::domain::{MatchRepository, RelayStats, Session};

/// リレー状態取得のユースケース
pub struct GetRelayStateUseCase {
    /// MatchRepository（検索キューとセッション表）
    match_repository: Arc<dyn MatchRepository>,
}

impl GetRelayStateUseCase {
    /// 新しい GetRelayStateUseCase を作成
    pub fn new(match_repository: Arc<dyn MatchRepository>) -> Self {
        Self { match_repository }
    }

    /// オンライン人数・検索中の人数・セッション数
    pub async fn stats(&self) -> RelayStats {
        self.match_repository.stats().await
    }

    /// 進行中のセッション（作成順）
    pub async fn sessions(&self) -> Vec<Session> {
        self.match_repository.sessions().await
    }
}
