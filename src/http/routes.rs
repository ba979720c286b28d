use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        // Session history
        .route(
            "/sessions",
            get(handlers::list_sessions).delete(handlers::clear_sessions),
        )
        // Monitoring lifecycle
        .route("/monitor/start", post(handlers::start_monitoring))
        .route("/monitor/stop", post(handlers::stop_monitoring))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
