//! UseCase 層
//!
//! ドメインの Repository / MessagePusher を組み合わせて、クライアントの
//! 操作（登録・検索・中継・終了）を実行します。

pub mod broadcast_presence;
pub mod error;
pub mod get_relay_state;
pub mod register_client;
pub mod relay_signal;
pub mod search_peer;
pub mod session_lifecycle;
pub mod unregister_client;

pub use broadcast_presence::BroadcastPresenceUseCase;
pub use error::{RegisterError, RelayError, SearchError};
pub use get_relay_state::GetRelayStateUseCase;
pub use register_client::RegisterClientUseCase;
pub use relay_signal::{RelaySignalUseCase, SignalKind};
pub use search_peer::{SearchPeerUseCase, SearchRequest};
pub use session_lifecycle::SessionLifecycleUseCase;
pub use unregister_client::UnregisterClientUseCase;
