pub mod api;
pub mod arbiter;
pub mod archive;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod ledger;
pub mod membership;
pub mod prompts;
pub mod registry;
pub mod scheduler;
pub mod sse;
pub mod state;
pub mod store;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use coordinator::Coordinator;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    build_app_with(Coordinator::new(config))
}

/// Build the router around an existing coordinator.
pub fn build_app_with(coordinator: Coordinator) -> (Router<()>, AppState) {
    let state = AppState::with_coordinator(coordinator);
    let timeout = Duration::from_secs(state.config.limits.request_timeout_secs);

    // Requests with a deadline. The feed is long-lived and stays outside.
    let api_routes = Router::new()
        .route("/rooms", post(api::create_room))
        .route("/rooms/{room}", get(api::lookup_room))
        .route("/rooms/{room}/join", post(api::join_room))
        .route("/rooms/{room}/start", post(api::start_game))
        .route("/rooms/{room}/advance", post(api::advance_round))
        .route("/rooms/{room}/end", post(api::end_game))
        .route("/rooms/{room}/leave", post(api::leave_room))
        .route("/rooms/{room}/archive", post(api::archive_session))
        .route("/rooms/{room}/state", get(api::room_state))
        .route("/rooms/{room}/scores", get(api::scores))
        .route("/rounds/{round}/guesses", post(api::submit_guess))
        .route("/rounds/{round}/artifact", post(api::record_artifact))
        .route("/history/{room}", get(api::session_history))
        .layer(TimeoutLayer::new(timeout));

    let feed_routes = Router::new().route("/rooms/{room}/feed", get(sse::room_feed));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes.merge(feed_routes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}
