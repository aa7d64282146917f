//! WebSocket message DTOs.
//!
//! Every frame is a JSON object with a `type` discriminator. Synonymous
//! message types observed across clients are accepted through serde aliases.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Inbound (client → relay)
// ========================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Register(RegisterPayload),
    ChatRegister(RegisterPayload),
    Search(SearchPayload),
    StopSearch {},
    /// End the current session and search again with the last criteria
    Next {},
    Offer {
        #[serde(default)]
        offer: Option<Value>,
    },
    Answer {
        #[serde(default)]
        answer: Option<Value>,
    },
    #[serde(rename = "ice-candidate", alias = "ice_candidate")]
    IceCandidate {
        #[serde(default)]
        candidate: Option<Value>,
    },
    #[serde(alias = "chat_message")]
    Message {
        #[serde(default)]
        text: Option<Value>,
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        recipient: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    VideoCallStart {
        #[serde(default)]
        has_audio: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    VideoCallAccept {
        #[serde(default)]
        has_audio: Option<bool>,
    },
    VideoCallDecline {},
    EndCall {},
    Disconnect {},
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegisterPayload {
    #[serde(rename = "walletAddress", alias = "wallet_address", alias = "clientId")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchPayload {
    pub filters: Option<FiltersDto>,
    #[serde(alias = "location")]
    pub user_location: Option<LocationDto>,
    pub profile: Option<ProfileDto>,
    /// Token balance; clients send it either as a number or a decimal string
    pub tas_balance: Option<Value>,
    pub has_advanced_filters: Option<bool>,
}

impl SearchPayload {
    pub fn tas_balance(&self) -> f64 {
        match &self.tas_balance {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn wants_advanced(&self) -> bool {
        self.has_advanced_filters.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FiltersDto {
    pub country: Option<String>,
    pub city: Option<String>,
    pub max_distance_km: Option<f64>,
    pub min_age: Option<u8>,
    pub max_age: Option<u8>,
    pub language: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocationDto {
    #[serde(alias = "countryCode", alias = "country_code")]
    pub country: Option<String>,
    pub city: Option<String>,
    #[serde(alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileDto {
    pub age: Option<u8>,
    pub language: Option<String>,
    pub gender: Option<String>,
}

// ========================================
// Outbound (relay → client)
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Registered { client_id: String },
    PeerFound(PeerFoundPayload),
    ChatMatched(PeerFoundPayload),
    #[serde(rename_all = "camelCase")]
    CallEnded { session_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    PeerDisconnected { session_id: String, reason: String },
    OnlineCount { count: usize },
    OnlineByCountry {
        count: usize,
        countries: BTreeMap<String, usize>,
    },
    Error { code: String, message: String },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerFoundPayload {
    pub peer_id: String,
    pub session_id: String,
    pub is_initiator: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_location: Option<PeerLocationDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerLocationDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}
