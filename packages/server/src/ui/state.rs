//! Shared application state.

use std::sync::Arc;

use crate::usecase::{
    BroadcastPresenceUseCase, GetRelayStateUseCase, RegisterClientUseCase, RelaySignalUseCase,
    SearchPeerUseCase, SessionLifecycleUseCase, UnregisterClientUseCase,
};

/// Shared application state
pub struct AppState {
    /// RegisterClientUseCase（クライアント登録のユースケース）
    pub register_client_usecase: Arc<RegisterClientUseCase>,
    /// UnregisterClientUseCase（クライアント登録解除のユースケース）
    pub unregister_client_usecase: Arc<UnregisterClientUseCase>,
    /// SearchPeerUseCase（ピア検索のユースケース）
    pub search_peer_usecase: Arc<SearchPeerUseCase>,
    /// RelaySignalUseCase（シグナリング中継のユースケース）
    pub relay_signal_usecase: Arc<RelaySignalUseCase>,
    /// SessionLifecycleUseCase（セッション終了のユースケース）
    pub session_lifecycle_usecase: Arc<SessionLifecycleUseCase>,
    /// BroadcastPresenceUseCase（オンライン人数配信のユースケース）
    pub broadcast_presence_usecase: Arc<BroadcastPresenceUseCase>,
    /// GetRelayStateUseCase（リレー状態取得のユースケース）
    pub get_relay_state_usecase: Arc<GetRelayStateUseCase>,
}
