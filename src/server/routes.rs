/// API Routes definition

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::static_files;
use super::websocket;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Everything is read-only; the sampler is the only writer
    let api_routes = Router::new()
        .route("/metrics", get(handlers::get_dashboard))
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/host", get(handlers::get_host))
        .route("/api/sampler", get(handlers::get_sampler_status))
        .route("/api/health", get(handlers::health_check))
        .route("/ws/metrics", get(websocket::ws_metrics_handler));

    let mut app = Router::new()
        .merge(api_routes)
        // Embedded dashboard, must be last to act as catch-all
        .fallback(static_files::static_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
