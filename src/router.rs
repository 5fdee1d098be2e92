use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/connect", post(handlers::connect))
        .route("/api/disconnect", post(handlers::disconnect))
        .route("/api/session", get(handlers::session))
        .route("/api/claim", post(handlers::claim))
        .route("/api/packages", get(handlers::packages))
        .route("/api/purchase", post(handlers::purchase))
        .route("/api/referral-tree", get(handlers::referral_tree))
        .route("/api/stats", get(handlers::stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
