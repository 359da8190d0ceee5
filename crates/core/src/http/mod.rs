//! Inbound RPC surface: synchronous request/response over HTTP, JSON
//! bodies, bearer-authenticated where the operation needs a caller
//! identity.

pub mod auth;
pub mod friends;
pub mod health;
pub mod messages;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::gateway;
use crate::state::AppState;

#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/auth/register", post(auth::register))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/messages", post(messages::send_message))
        .route(
            "/v1/friends/requests",
            post(friends::send_friend_request),
        )
        .route(
            "/v1/friends/requests/received",
            get(friends::get_received_friend_requests),
        )
        .route(
            "/v1/friends/requests/sent",
            get(friends::get_sent_friend_requests),
        )
        .route(
            "/v1/friends/requests/:id/handle",
            post(friends::handle_friend_request),
        )
        .route("/v1/friends", get(friends::get_friend_list))
        .route("/ws/v1/connect", get(gateway::connect))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
