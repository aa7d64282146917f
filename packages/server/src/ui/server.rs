//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::{
    BroadcastPresenceUseCase, GetRelayStateUseCase, RegisterClientUseCase, RelaySignalUseCase,
    SearchPeerUseCase, SessionLifecycleUseCase, UnregisterClientUseCase,
};

use super::{
    handler::{debug_state, get_stats, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Matchmaking and signaling relay server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(
///     register_client_usecase,
///     unregister_client_usecase,
///     search_peer_usecase,
///     relay_signal_usecase,
///     session_lifecycle_usecase,
///     broadcast_presence_usecase,
///     get_relay_state_usecase,
/// );
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new Server instance
    pub fn new(
        register_client_usecase: Arc<RegisterClientUseCase>,
        unregister_client_usecase: Arc<UnregisterClientUseCase>,
        search_peer_usecase: Arc<SearchPeerUseCase>,
        relay_signal_usecase: Arc<RelaySignalUseCase>,
        session_lifecycle_usecase: Arc<SessionLifecycleUseCase>,
        broadcast_presence_usecase: Arc<BroadcastPresenceUseCase>,
        get_relay_state_usecase: Arc<GetRelayStateUseCase>,
    ) -> Self {
        Self {
            state: AppState {
                register_client_usecase,
                unregister_client_usecase,
                search_peer_usecase,
                relay_signal_usecase,
                session_lifecycle_usecase,
                broadcast_presence_usecase,
                get_relay_state_usecase,
            },
        }
    }

    /// Build the router with every endpoint
    pub fn router(self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/stats", get(get_stats))
            .route("/debug/state", get(debug_state))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self.state))
    }

    /// Run the relay server until Ctrl+C / SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> std::io::Result<()> {
        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Relay server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
