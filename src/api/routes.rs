use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Leave room for the multipart framing around the file itself.
    let upload_limit = (state.config.max_upload_size as usize).saturating_add(64 * 1024);

    Router::new()
        // Authentication
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/session", get(handlers::current_session))
        .route(
            "/auth/recovery",
            get(handlers::check_recovery_token).post(handlers::request_recovery),
        )
        .route("/auth/recovery/reset", post(handlers::reset_password))
        // Areas
        .route("/areas", get(handlers::list_areas))
        .route(
            "/areas/:area/files",
            get(handlers::list_files)
                .post(handlers::create_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/areas/:area/grid", get(handlers::file_grid))
        .route(
            "/areas/:area/files/:name",
            get(handlers::download_file)
                .put(handlers::update_file)
                .delete(handlers::delete_file),
        )
        .route(
            "/areas/:area/links",
            get(handlers::list_links).post(handlers::create_link),
        )
        .route(
            "/areas/:area/links/:index",
            put(handlers::update_link).delete(handlers::delete_link),
        )
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
