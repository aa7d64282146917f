//! HTTP API response DTOs.

use std::collections::BTreeMap;

use serde::Serialize;

/// Relay counters returned by `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    pub online: usize,
    pub searching: usize,
    pub active_sessions: usize,
    pub online_by_country: BTreeMap<String, usize>,
}

/// One session as shown by `GET /debug/state`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub session_id: String,
    pub peer_a: String,
    pub peer_b: String,
    pub initiator: String,
    pub state: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugStateDto {
    pub sessions: Vec<SessionDto>,
}
