//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use deai_shared::time::timestamp_to_rfc3339;

use crate::{
    domain::SessionState,
    infrastructure::dto::http::{DebugStateDto, SessionDto, StatsDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Online / searching / in-session counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsDto> {
    let stats = state.get_relay_state_usecase.stats().await;

    // Domain Model から DTO への変換
    Json(StatsDto {
        online: stats.presence.online,
        searching: stats.searching,
        active_sessions: stats.active_sessions,
        online_by_country: stats.presence.by_country,
    })
}

/// Debug endpoint listing live sessions (for testing purposes)
pub async fn debug_state(State(state): State<Arc<AppState>>) -> Json<DebugStateDto> {
    let sessions = state.get_relay_state_usecase.sessions().await;

    // Domain Model から DTO への変換
    let sessions = sessions
        .into_iter()
        .map(|session| SessionDto {
            session_id: session.id.as_str().to_string(),
            initiator: session.initiator().as_str().to_string(),
            peer_a: session.peer_a.into_string(),
            peer_b: session.peer_b.into_string(),
            state: match session.state {
                SessionState::Paired => "paired",
                SessionState::ActiveCall => "active_call",
                SessionState::Ended => "ended",
            }
            .to_string(),
            created_at: timestamp_to_rfc3339(session.created_at.value()),
        })
        .collect();

    Json(DebugStateDto { sessions })
}
