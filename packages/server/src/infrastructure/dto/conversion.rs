//! Conversion logic between DTOs and domain types.

use crate::domain::{
    AgeRange, Dialect, DisclosedLocation, EndReason, LocationHint, Notification, SearchCriteria,
    SearchFilters, SelfProfile,
};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain
// ========================================

impl From<dto::LocationDto> for LocationHint {
    fn from(dto: dto::LocationDto) -> Self {
        Self {
            country: dto.country,
            city: dto.city,
            latitude: dto.latitude,
            longitude: dto.longitude,
        }
    }
}

impl From<dto::FiltersDto> for SearchFilters {
    fn from(dto: dto::FiltersDto) -> Self {
        let age_range = if dto.min_age.is_some() || dto.max_age.is_some() {
            Some(AgeRange {
                min: dto.min_age,
                max: dto.max_age,
            })
        } else {
            None
        };
        Self {
            country: dto.country,
            city: dto.city,
            max_distance_km: dto.max_distance_km,
            age_range,
            language: dto.language,
            gender: dto.gender,
        }
    }
}

impl From<dto::ProfileDto> for SelfProfile {
    fn from(dto: dto::ProfileDto) -> Self {
        Self {
            age: dto.age,
            language: dto.language,
            gender: dto.gender,
        }
    }
}

impl From<dto::SearchPayload> for SearchCriteria {
    fn from(dto: dto::SearchPayload) -> Self {
        Self {
            filters: dto.filters.map(Into::into).unwrap_or_default(),
            profile: dto.profile.map(Into::into).unwrap_or_default(),
            location: dto.user_location.map(Into::into),
        }
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<DisclosedLocation> for dto::PeerLocationDto {
    fn from(model: DisclosedLocation) -> Self {
        Self {
            country: model.country,
            city: model.city,
        }
    }
}

impl From<&Notification> for dto::OutboundMessage {
    fn from(model: &Notification) -> Self {
        match model {
            Notification::Registered { client_id } => Self::Registered {
                client_id: client_id.as_str().to_string(),
            },
            Notification::PeerFound {
                dialect,
                session_id,
                peer_id,
                is_initiator,
                peer_location,
            } => {
                let payload = dto::PeerFoundPayload {
                    peer_id: peer_id.as_str().to_string(),
                    session_id: session_id.as_str().to_string(),
                    is_initiator: *is_initiator,
                    peer_location: peer_location.clone().map(Into::into),
                };
                match dialect {
                    Dialect::Video => Self::PeerFound(payload),
                    Dialect::Chat => Self::ChatMatched(payload),
                }
            }
            Notification::SessionEnded { session_id, reason } => {
                let session_id = session_id.as_str().to_string();
                let reason_text = reason.as_str().to_string();
                match reason {
                    EndReason::EndCall => Self::CallEnded {
                        session_id,
                        reason: reason_text,
                    },
                    _ => Self::PeerDisconnected {
                        session_id,
                        reason: reason_text,
                    },
                }
            }
            Notification::OnlineCount { count } => Self::OnlineCount { count: *count },
            Notification::OnlineByCountry(snapshot) => Self::OnlineByCountry {
                count: snapshot.online,
                countries: snapshot.by_country.clone(),
            },
            Notification::Error { code, message } => Self::Error {
                code: code.as_str().to_string(),
                message: message.clone(),
            },
        }
    }
}
