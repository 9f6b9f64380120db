pub mod agents;
pub mod api;
pub mod auth;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router. Shared by `main` and the
/// integration tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .merge(agents::router())
        .merge(auth::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
