use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::state::AppState;

mod health;
mod metrics;
mod notes;
mod rate_limit;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use notes::{generate_questions_handler, parse_handler, scrape_handler};
pub use rate_limit::rate_limit_middleware;

/// Full router. Only the note endpoints count against the ingress limit.
pub fn router(state: AppState) -> Router {
    let notes = Router::new()
        .route("/notes/scrape", post(scrape_handler))
        .route("/notes/parse", post(parse_handler))
        .route("/notes/generate-questions", post(generate_questions_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", notes)
        .with_state(state)
}
