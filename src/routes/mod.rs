pub mod calls;
pub mod conversations;
pub mod matches;
pub mod messages;
pub mod presence;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/likes", post(matches::like))
        .route("/matches/:id", get(matches::get_match))
        .route("/matches/:id", delete(matches::unmatch))
        .route("/matches/:id/level", post(matches::advance_level))
        .route("/compatibility", post(matches::compatibility))
        .route("/users/:id/conversations", get(conversations::list))
        .route("/conversations/:id", get(conversations::get))
        .route("/conversations/:id/read", post(conversations::mark_read))
        .route("/conversations/:id/messages", post(messages::send))
        .route("/conversations/:id/messages", get(messages::history))
        .route("/messages/:id/read", post(messages::mark_read))
        .route("/messages/:id/delivered", post(messages::mark_delivered))
        .route("/messages/:id", delete(messages::delete))
        .route("/matches/:id/calls", post(calls::initiate))
        .route("/calls/:id", get(calls::get))
        .route("/calls/:id/ring", post(calls::ring))
        .route("/calls/:id/answer", post(calls::answer))
        .route("/calls/:id/candidates", post(calls::add_candidate))
        .route("/calls/:id/candidates", get(calls::list_candidates))
        .route("/calls/:id/connected", post(calls::connected))
        .route("/calls/:id/end", post(calls::end))
        .route("/calls/:id/reject", post(calls::reject))
        .route("/users/:id/calls/pending", get(calls::pending))
        .route("/users/:id/calls/history", get(calls::history))
        .route("/conversations/:id/typing", post(presence::set_typing))
        .route("/conversations/:id/typing", get(presence::get_typing))
        .route("/presence/:user_id", put(presence::set_presence))
        .route("/presence/:user_id", get(presence::get_presence));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
