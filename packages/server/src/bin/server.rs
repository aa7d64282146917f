//! Deai relay server: pairs anonymous clients and relays their WebRTC
//! signaling over WebSocket.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin deai-server
//! cargo run --bin deai-server -- --host 0.0.0.0 --port 3000 --presence-by-country
//! ```

use std::{collections::HashMap, sync::Arc};

use clap::Parser;
use deai_server::{
    config::RelayConfig,
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryRelayStore},
    ui::Server,
    usecase::{
        BroadcastPresenceUseCase, GetRelayStateUseCase, RegisterClientUseCase,
        RelaySignalUseCase, SearchPeerUseCase, SessionLifecycleUseCase, UnregisterClientUseCase,
    },
};
use deai_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "deai-server")]
#[command(about = "Stranger matchmaking and WebRTC signaling relay", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "DEAI_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "DEAI_PORT", default_value = "8080")]
    port: u16,

    /// Also push per-country online counts
    #[arg(long, env = "DEAI_PRESENCE_BY_COUNTRY")]
    presence_by_country: bool,

    /// Minimum tasBalance required for city/distance/age/language/gender filters
    #[arg(long, env = "DEAI_ADVANCED_FILTER_MIN_BALANCE", default_value = "0")]
    advanced_filter_min_balance: f64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = RelayConfig {
        presence_by_country: args.presence_by_country,
        advanced_filter_min_balance: args.advanced_filter_min_balance,
    };
    tracing::info!("Starting relay with {:?}", config);

    // Initialize dependencies in order:
    // 1. Repository
    // 2. MessagePusher
    // 3. UseCases
    // 4. Server

    // 1. Create Repository (in-memory registry, queue and sessions)
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryRelayStore::new(clock.clone()));

    // 2. Create MessagePusher (WebSocket implementation)
    let message_pusher_clients = Arc::new(Mutex::new(HashMap::new()));
    let message_pusher = Arc::new(WebSocketMessagePusher::new(message_pusher_clients));

    // 3. Create UseCases
    let session_lifecycle_usecase = Arc::new(SessionLifecycleUseCase::new(
        store.clone(),
        store.clone(),
        message_pusher.clone(),
    ));
    let register_client_usecase = Arc::new(RegisterClientUseCase::new(
        store.clone(),
        message_pusher.clone(),
        session_lifecycle_usecase.clone(),
        clock.clone(),
    ));
    let unregister_client_usecase = Arc::new(UnregisterClientUseCase::new(
        store.clone(),
        message_pusher.clone(),
        session_lifecycle_usecase.clone(),
    ));
    let broadcast_presence_usecase = Arc::new(BroadcastPresenceUseCase::new(
        store.clone(),
        message_pusher.clone(),
        config.clone(),
    ));
    let search_peer_usecase = Arc::new(SearchPeerUseCase::new(
        store.clone(),
        store.clone(),
        session_lifecycle_usecase.clone(),
        broadcast_presence_usecase.clone(),
        config,
        clock,
    ));
    let relay_signal_usecase = Arc::new(RelaySignalUseCase::new(store.clone(), message_pusher));
    let get_relay_state_usecase = Arc::new(GetRelayStateUseCase::new(store));

    // 4. Create and run the server
    let server = Server::new(
        register_client_usecase,
        unregister_client_usecase,
        search_peer_usecase,
        relay_signal_usecase,
        session_lifecycle_usecase,
        broadcast_presence_usecase,
        get_relay_state_usecase,
    );
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
