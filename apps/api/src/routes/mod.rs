pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::rewrite::handlers as rewrite;
use crate::state::AppState;
use crate::store::handlers;
use crate::summary::handlers as summary;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/session",
            get(handlers::handle_get_session).delete(handlers::handle_sign_out),
        )
        // Wins
        .route(
            "/api/v1/wins",
            get(handlers::handle_list_wins).post(handlers::handle_add_win),
        )
        .route("/api/v1/wins/range", get(handlers::handle_wins_in_range))
        .route(
            "/api/v1/wins/:id",
            patch(handlers::handle_update_win).delete(handlers::handle_delete_win),
        )
        .route("/api/v1/stats", get(handlers::handle_stats))
        .route("/api/v1/taxonomy", get(handlers::handle_taxonomy))
        // Reflections & profile
        .route(
            "/api/v1/reflections",
            get(handlers::handle_list_reflections).post(handlers::handle_add_reflection),
        )
        .route(
            "/api/v1/profile",
            get(handlers::handle_get_profile).patch(handlers::handle_update_profile),
        )
        // Summaries, backup, AI rewrite
        .route("/api/v1/summary", get(summary::handle_summary))
        .route("/api/v1/export", get(summary::handle_export))
        .route("/api/v1/rewrite", post(rewrite::handle_rewrite))
        .with_state(state)
}
