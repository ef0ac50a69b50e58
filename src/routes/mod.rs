// ============================================================================
// Axum Routes
// ============================================================================
//
// - ws.rs: WebSocket upgrade, one Connection per socket
// - history.rs: paginated message history between two users
// - health.rs: health check and Prometheus metrics
//
// ============================================================================

mod health;
mod history;
mod ws;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub use history::{HistoryQuery, HistoryResponse};

/// Create the application router
pub fn create_router(app_context: AppContext) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/history", get(history::get_history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(app_context)
}
