//! UseCase 層のエラー型

use thiserror::Error;

use crate::domain::{MatchError, ValueObjectError};

/// クライアント登録のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// clientId の形式が不正
    #[error("invalid client id: {0}")]
    InvalidClientId(#[from] ValueObjectError),
}

/// 検索・マッチングのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// 登録されていないクライアントからの検索
    #[error("client '{0}' is not registered")]
    NotRegistered(String),
}

impl From<MatchError> for SearchError {
    fn from(error: MatchError) -> Self {
        match error {
            MatchError::NotRegistered(client_id) => SearchError::NotRegistered(client_id),
        }
    }
}

/// シグナリング中継のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// 送信者がセッションに参加していない
    #[error("client '{0}' has no active session")]
    NoActiveSession(String),

    /// ピアの送信キューに届けられなかった
    #[error("peer '{0}' is unreachable")]
    PeerUnreachable(String),
}
