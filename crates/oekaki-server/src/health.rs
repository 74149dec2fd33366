use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub feed: FeedHealth,
    pub rooms: RoomHealth,
    pub archived_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct FeedHealth {
    pub subscribers: usize,
    pub max_subscribers: usize,
    pub last_seq: u64,
}

#[derive(Debug, Serialize)]
pub struct RoomHealth {
    pub total: usize,
    pub in_progress: usize,
    pub active_rounds: usize,
    pub players: usize,
}

/// Coordinator status: feed subscribers, room and round counts.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.coordinator.stats();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        feed: FeedHealth {
            subscribers: state.sse_subscriber_count.load(Ordering::Relaxed),
            max_subscribers: state.config.limits.max_sse_subscribers,
            last_seq: stats.last_seq,
        },
        rooms: RoomHealth {
            total: stats.rooms,
            in_progress: stats.rooms_in_progress,
            active_rounds: stats.active_rounds,
            players: stats.active_members,
        },
        archived_sessions: stats.archived_sessions,
    })
}

/// Ready once there is something to draw.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.coordinator.prompt_count() == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready: prompt catalog is empty",
        );
    }
    (StatusCode::OK, "ready")
}
